use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use vault_autofill::background::memory::MemoryStores;
use vault_autofill::background::port_handler::{BackgroundEvent, PortHandler};
use vault_autofill::background::runtime::{ChannelOutbox, ManualClock, ManualScheduler, OutboundMessage};
use vault_autofill::error::Result;
use vault_autofill::flows::flow_model::SavePolicy;
use vault_autofill::messages::message_model::{Action, FlowKind, Message, SubmitData};
use vault_autofill::messages::port::{OverlayPurpose, PORT_CONTENT, PortId, PortInfo, PortSender, TabId};
use vault_autofill::vault::client::MemoryVault;
use vault_autofill::vault::vault_model::{Session, Settings, VaultField, VaultObject};

use crate::common::pages::LOGIN_URL;

pub const NOW_MS: u64 = 1_700_000_000_000;
pub const HOST: &str = "safe.example.org";
pub const TAB: TabId = 7;

// ============================================================================
// Vault data
// ============================================================================

pub fn login_object(id: &str, username: &str, password: &str, url: &str) -> VaultObject {
    VaultObject {
        host: HOST.to_string(),
        id: id.to_string(),
        template_id: "20".to_string(),
        vault_id: "1".to_string(),
        name: format!("{} at example", username),
        object_type: "login".to_string(),
        icon: "ico_server".to_string(),
        is_decrypted: false,
        fields: vec![
            VaultField::plain("url", url),
            VaultField::plain("username", username),
            VaultField::secret("password", password),
        ],
    }
}

pub fn session() -> Session {
    Session {
        host: HOST.to_string(),
        token: "token-1".to_string(),
        created_at: NOW_MS - 60_000,
    }
}

pub fn stores(objects: Vec<VaultObject>) -> MemoryStores {
    MemoryStores::new(MemoryVault::with_objects(objects), vec![session()], Settings::default(), vec![])
}

// ============================================================================
// Ports and messages
// ============================================================================

pub fn sender(tab_id: TabId) -> PortSender {
    PortSender {
        tab_id,
        url: LOGIN_URL.to_string(),
        title: "Example login".to_string(),
    }
}

pub fn content_port(id: PortId, tab_id: TabId) -> PortInfo {
    PortInfo::new(id, PORT_CONTENT, Some(sender(tab_id)))
}

pub fn overlay_port(id: PortId, tab_id: TabId, flow: FlowKind, purpose: OverlayPurpose) -> PortInfo {
    PortInfo::new(id, &purpose.port_name(flow), Some(sender(tab_id)))
}

pub fn submit_message(username: &str, password: &str) -> Message {
    let data = SubmitData {
        fields: vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ],
        name: String::new(),
        url: String::new(),
    };
    Message::new(FlowKind::Save, Action::Submit).with_data(serde_json::to_value(data).unwrap())
}

pub fn types(messages: &[OutboundMessage]) -> Vec<(PortId, String)> {
    messages
        .iter()
        .map(|m| (m.port, m.message.message_type.clone()))
        .collect()
}

// ============================================================================
// Coordinator harness on a manual clock
// ============================================================================

pub struct Harness {
    pub stores: MemoryStores,
    pub clock: Arc<ManualClock>,
    pub scheduler: ManualScheduler,
    pub handler: PortHandler,
    pub outbound: UnboundedReceiver<OutboundMessage>,
}

impl Harness {
    pub fn new(objects: Vec<VaultObject>) -> Self {
        Self::with_stores(stores(objects))
    }

    pub fn with_stores(stores: MemoryStores) -> Self {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let scheduler = ManualScheduler::new(clock.clone());
        let (outbox, outbound) = ChannelOutbox::channel();
        let handler = PortHandler::new(
            stores.collaborators(),
            Box::new(outbox),
            Box::new(scheduler.clone()),
            clock.clone(),
            SavePolicy::default(),
        );
        Self {
            stores,
            clock,
            scheduler,
            handler,
            outbound,
        }
    }

    pub async fn send(&mut self, event: BackgroundEvent) -> Result<()> {
        self.handler.handle(event).await
    }

    pub async fn connect(&mut self, port: PortInfo) {
        self.send(BackgroundEvent::Connect(port)).await.unwrap();
    }

    pub async fn message(&mut self, port: PortId, message: Message) -> Result<()> {
        self.send(BackgroundEvent::Message { port, message }).await
    }

    pub async fn disconnect(&mut self, port: PortId) {
        self.send(BackgroundEvent::Disconnect { port }).await.unwrap();
    }

    /// Move the clock and deliver every timer that became due.
    pub async fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        for event in self.scheduler.due() {
            self.send(event).await.unwrap();
        }
    }

    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            out.push(message);
        }
        out
    }
}
