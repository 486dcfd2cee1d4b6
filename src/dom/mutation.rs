use crate::dom::dom_model::NodeId;

/// One structural change, shaped like a `MutationObserver` record:
/// `added`/`removed` children of `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    pub fn added(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added: vec![node],
            removed: vec![],
        }
    }

    pub fn removed(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added: vec![],
            removed: vec![node],
        }
    }
}

pub type MutationBatch = Vec<MutationRecord>;
