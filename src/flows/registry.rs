use std::collections::HashMap;

use crate::flows::fill_flow::FillFlow;
use crate::flows::flow_model::FlowId;
use crate::flows::save_flow::SaveFlow;
use crate::messages::message_model::FlowKind;
use crate::messages::port::TabId;

/// Active flows, at most one of each kind per tab. Owned by the coordinator.
#[derive(Debug, Default)]
pub struct FlowRegistry {
    next_id: u64,
    save: HashMap<TabId, SaveFlow>,
    fill: HashMap<TabId, FillFlow>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> FlowId {
        self.next_id += 1;
        FlowId(self.next_id)
    }

    pub fn save(&self, tab_id: TabId) -> Option<&SaveFlow> {
        self.save.get(&tab_id)
    }

    pub fn save_mut(&mut self, tab_id: TabId) -> Option<&mut SaveFlow> {
        self.save.get_mut(&tab_id)
    }

    pub fn fill(&self, tab_id: TabId) -> Option<&FillFlow> {
        self.fill.get(&tab_id)
    }

    pub fn fill_mut(&mut self, tab_id: TabId) -> Option<&mut FillFlow> {
        self.fill.get_mut(&tab_id)
    }

    /// Detach the tab's save flow, e.g. to cancel it before a replacement.
    pub fn take_save(&mut self, tab_id: TabId) -> Option<SaveFlow> {
        self.save.remove(&tab_id)
    }

    pub fn take_fill(&mut self, tab_id: TabId) -> Option<FillFlow> {
        self.fill.remove(&tab_id)
    }

    pub fn insert_save(&mut self, flow: SaveFlow) {
        self.save.insert(flow.tab_id(), flow);
    }

    pub fn insert_fill(&mut self, flow: FillFlow) {
        self.fill.insert(flow.tab_id(), flow);
    }

    /// Whether `id` is still the live flow of its kind on `tab_id`.
    pub fn is_live(&self, kind: FlowKind, tab_id: TabId, id: FlowId) -> bool {
        match kind {
            FlowKind::Save => self.save.get(&tab_id).is_some_and(|f| f.id() == id),
            FlowKind::Fill => self.fill.get(&tab_id).is_some_and(|f| f.id() == id),
        }
    }

    /// Drop flows that reached `Closed`.
    pub fn purge_closed(&mut self) {
        self.save.retain(|_, f| !f.is_closed());
        self.fill.retain(|_, f| !f.is_closed());
    }

    pub fn len(&self) -> usize {
        self.save.len() + self.fill.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
