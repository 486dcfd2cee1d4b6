use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::background::collaborators::Collaborators;
use crate::background::runtime::{Clock, Outbox, Scheduler};
use crate::background::session_tools::{should_save, strip_url_path};
use crate::background::tab_handler::TabHandler;
use crate::error::{AutofillError, Result};
use crate::flows::fill_flow::{FillDecision, FillFlow, plan_fill};
use crate::flows::flow_model::{Effect, FlowEvent, FlowId, FlowState, SavePolicy};
use crate::flows::registry::FlowRegistry;
use crate::flows::save_flow::SaveFlow;
use crate::forms::forms_tools::parse_result;
use crate::messages::message_model::{Action, FlowKind, Message, SubmitData};
use crate::messages::port::{PortId, PortInfo, PortRole, TabId};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::FlowTraceEvent;
use crate::vault::vault_model::VaultObject;

/// Everything the background coordinator reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundEvent {
    Connect(PortInfo),
    Message { port: PortId, message: Message },
    Disconnect { port: PortId },
    TimerFired { tab_id: TabId, flow_id: FlowId },
    TabRemoved { tab_id: TabId },
    /// Hosts that still have a session after a change
    SessionsChanged { hosts: Vec<String> },
}

/// Routes port traffic to the per-tab flows and carries out their effects.
///
/// Events are handled one at a time; an awaited lookup finishes before the
/// next event is looked at, so flows never observe interleaved transitions.
pub struct PortHandler {
    ports: HashMap<PortId, PortInfo>,
    flows: FlowRegistry,
    collab: Collaborators,
    tabs: TabHandler,
    known_hosts: HashSet<String>,

    outbox: Box<dyn Outbox>,
    scheduler: Box<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    policy: SavePolicy,
    tracer: Option<TraceLogger>,
}

impl PortHandler {
    pub fn new(
        collab: Collaborators,
        outbox: Box<dyn Outbox>,
        scheduler: Box<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        policy: SavePolicy,
    ) -> Self {
        Self {
            ports: HashMap::new(),
            flows: FlowRegistry::new(),
            tabs: TabHandler::new(collab.clone()),
            collab,
            known_hosts: HashSet::new(),
            outbox,
            scheduler,
            clock,
            policy,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: TraceLogger) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Hosts whose results stay cached until their session ends.
    pub fn with_known_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.known_hosts = hosts.into_iter().collect();
        self
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn tabs(&self) -> &TabHandler {
        &self.tabs
    }

    pub fn is_connected(&self, port: PortId) -> bool {
        self.ports.contains_key(&port)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub async fn handle(&mut self, event: BackgroundEvent) -> Result<()> {
        match event {
            BackgroundEvent::Connect(port) => self.on_connect(port).await,
            BackgroundEvent::Message { port, message } => self.on_message(port, message).await,
            BackgroundEvent::Disconnect { port } => self.on_disconnect(port).await,
            BackgroundEvent::TimerFired { tab_id, flow_id } => self.on_timer(tab_id, flow_id).await,
            BackgroundEvent::TabRemoved { tab_id } => self.on_tab_removed(tab_id).await,
            BackgroundEvent::SessionsChanged { hosts } => self.on_sessions_changed(hosts).await,
        }
    }

    // ========================================================================
    // Port lifecycle
    // ========================================================================

    async fn on_connect(&mut self, port: PortInfo) -> Result<()> {
        debug!(port = port.id, name = %port.name, tab_id = ?port.tab_id(), "port connected");
        let (id, role, tab) = (port.id, port.role(), port.tab_id());
        self.ports.insert(id, port);

        match (role, tab) {
            (Some(PortRole::Content), Some(tab)) => {
                if self.flows.save(tab).is_some() {
                    let now_ms = self.clock.now_ms();
                    self.step_flow(FlowKind::Save, tab, FlowEvent::ContentConnected { port: id, now_ms })
                        .await?;
                }
            }
            (Some(PortRole::Overlay { flow, purpose }), Some(tab)) => {
                if self.has_flow(flow, tab) {
                    self.step_flow(flow, tab, FlowEvent::OverlayConnected { port: id, purpose })
                        .await?;
                } else {
                    debug!(port = id, tab_id = tab, flow = flow.as_str(), "overlay without a flow");
                }
            }
            _ => debug!(port = id, "port is not tracked by any flow"),
        }
        Ok(())
    }

    async fn on_disconnect(&mut self, port_id: PortId) -> Result<()> {
        let port = self.ports.remove(&port_id).ok_or_else(|| {
            AutofillError::protocol("port_handler", format!("disconnect of unknown port {}", port_id))
        })?;
        debug!(port = port_id, name = %port.name, "port disconnected");
        let Some(tab) = port.tab_id() else {
            return Ok(());
        };

        match port.role() {
            Some(PortRole::Content) => {
                for kind in [FlowKind::Save, FlowKind::Fill] {
                    if self.has_flow(kind, tab) {
                        self.step_flow(kind, tab, FlowEvent::ContentDisconnected { port: port_id })
                            .await?;
                    }
                }
            }
            Some(PortRole::Overlay { flow, .. }) => {
                if self.has_flow(flow, tab) {
                    self.step_flow(flow, tab, FlowEvent::OverlayDisconnected { port: port_id })
                        .await?;
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn on_message(&mut self, port_id: PortId, message: Message) -> Result<()> {
        let port = self.ports.get(&port_id).cloned().ok_or_else(|| {
            AutofillError::protocol("port_handler", format!("message on unknown port {}", port_id))
        })?;
        let kind = message.kind()?;
        debug!(port = port_id, message = %kind, "incoming message");

        match port.role() {
            Some(PortRole::Content) => match (kind.flow, kind.action) {
                (FlowKind::Save, Action::Init | Action::Submit) => self.start_save(&port, &message).await,
                (FlowKind::Fill, Action::Init) => self.start_fill(&port).await,
                _ => Err(AutofillError::protocol(
                    "port_handler",
                    format!("unexpected {} from the content script", kind),
                )),
            },
            Some(PortRole::Overlay { flow, .. }) => {
                let tab = require_tab(&port)?;
                if !self.has_flow(flow, tab) {
                    return Err(AutofillError::protocol(
                        "port_handler",
                        format!("{} for tab {} without a {} flow", kind, tab, flow.as_str()),
                    ));
                }
                self.step_flow(flow, tab, FlowEvent::OverlayMessage { port: port_id, message })
                    .await
            }
            None => Err(AutofillError::protocol(
                "port_handler",
                format!("message on unrecognised port {:?}", port.name),
            )),
        }
    }

    async fn on_timer(&mut self, tab_id: TabId, flow_id: FlowId) -> Result<()> {
        if !self.flows.is_live(FlowKind::Save, tab_id, flow_id) {
            debug!(tab_id, flow_id = flow_id.0, "discarding stale timer");
            if let Some(tracer) = &self.tracer {
                tracer.log(
                    &FlowTraceEvent::new(self.clock.now_ms(), tab_id, flow_id, FlowKind::Save)
                        .with_event(FlowEvent::TimedOut.label())
                        .with_note("stale timer discarded"),
                );
            }
            return Ok(());
        }
        self.step_flow(FlowKind::Save, tab_id, FlowEvent::TimedOut).await
    }

    async fn on_tab_removed(&mut self, tab_id: TabId) -> Result<()> {
        info!(tab_id, "tab removed");
        if let Err(e) = self.tabs.purge_tab(tab_id).await {
            warn!(tab_id, error = %e, "failed to purge tab results");
        }
        if let Some(flow) = self.flows.take_save(tab_id) {
            self.cancel_save(flow).await?;
        }
        if let Some(flow) = self.flows.take_fill(tab_id) {
            self.cancel_fill(flow).await?;
        }
        self.ports.retain(|_, p| p.tab_id() != Some(tab_id));
        Ok(())
    }

    /// Forget cached results of hosts whose session went away.
    async fn on_sessions_changed(&mut self, hosts: Vec<String>) -> Result<()> {
        let current: HashSet<String> = hosts.into_iter().collect();
        let gone: Vec<String> = self.known_hosts.difference(&current).cloned().collect();
        for host in gone {
            info!(host = %host, "session ended, purging its results");
            self.tabs.purge_host(&host).await?;
        }
        self.known_hosts = current;
        Ok(())
    }

    // ========================================================================
    // Flow creation
    // ========================================================================

    async fn start_save(&mut self, port: &PortInfo, message: &Message) -> Result<()> {
        let tab = require_tab(port)?;
        let data = submitted_pairs(message)?;

        if let Some(previous) = self.flows.take_save(tab) {
            debug!(tab_id = tab, "replacing save flow");
            self.cancel_save(previous).await?;
        }

        let now_ms = self.clock.now_ms();
        match should_save(&self.collab, tab, port.url(), &data, now_ms).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                warn!(tab_id = tab, error = %e, "could not decide whether to save");
                return Ok(());
            }
        }

        let id = self.flows.next_id();
        let mut flow = SaveFlow::new(id, port, data, self.policy)?;
        let effects = flow.start(port.id, now_ms)?;
        let state = flow.state();
        self.flows.insert_save(flow);
        info!(tab_id = tab, flow_id = id.0, "save flow started");

        self.trace(FlowKind::Save, tab, id, state, "start", &effects);
        self.execute(tab, id, effects).await
    }

    async fn start_fill(&mut self, port: &PortInfo) -> Result<()> {
        let tab = require_tab(port)?;
        let settings = self.collab.settings.fetch().await?;
        if !settings.auto_fill {
            debug!(tab_id = tab, "autofill disabled");
            return Ok(());
        }

        let now_ms = self.clock.now_ms();
        let results = match self.tabs.results_for(tab, port.url(), now_ms).await {
            Ok(results) => results,
            Err(e) => {
                warn!(tab_id = tab, error = %e, "result lookup failed");
                return Ok(());
            }
        };

        let last_used = if results.len() > 1 {
            let key = strip_url_path(port.url());
            self.collab.preferences.last_used(&key).await.unwrap_or_else(|e| {
                warn!(error = %e, "could not read last used result");
                None
            })
        } else {
            None
        };

        let decision = plan_fill(&results, last_used.as_ref());
        if !matches!(decision, FillDecision::Nothing) {
            if let Some(previous) = self.flows.take_fill(tab) {
                self.cancel_fill(previous).await?;
            }
        }

        match decision {
            FillDecision::Nothing => {
                debug!(tab_id = tab, "nothing to fill");
                Ok(())
            }
            FillDecision::FillNow { object, remember } => self.fill(port.id, &object, remember).await,
            FillDecision::Prompt => {
                let id = self.flows.next_id();
                let mut flow = FillFlow::new(id, tab, port.id, results);
                let effects = flow.start()?;
                let state = flow.state();
                self.flows.insert_fill(flow);
                info!(tab_id = tab, flow_id = id.0, "fill flow started");

                self.trace(FlowKind::Fill, tab, id, state, "start", &effects);
                self.execute(tab, id, effects).await
            }
        }
    }

    async fn cancel_save(&mut self, mut flow: SaveFlow) -> Result<()> {
        let effects = flow.step(FlowEvent::Cancel)?;
        self.trace(FlowKind::Save, flow.tab_id(), flow.id(), flow.state(), "cancel", &effects);
        self.execute(flow.tab_id(), flow.id(), effects).await
    }

    async fn cancel_fill(&mut self, mut flow: FillFlow) -> Result<()> {
        let effects = flow.step(FlowEvent::Cancel)?;
        self.trace(FlowKind::Fill, flow.tab_id(), flow.id(), flow.state(), "cancel", &effects);
        self.execute(flow.tab_id(), flow.id(), effects).await
    }

    // ========================================================================
    // Transitions and effects
    // ========================================================================

    fn has_flow(&self, kind: FlowKind, tab: TabId) -> bool {
        match kind {
            FlowKind::Save => self.flows.save(tab).is_some(),
            FlowKind::Fill => self.flows.fill(tab).is_some(),
        }
    }

    async fn step_flow(&mut self, kind: FlowKind, tab: TabId, event: FlowEvent) -> Result<()> {
        let label = event.label();
        let (id, state, effects) = match kind {
            FlowKind::Save => {
                let flow = self.flows.save_mut(tab).ok_or_else(|| no_flow(kind, tab))?;
                let effects = flow.step(event)?;
                (flow.id(), flow.state(), effects)
            }
            FlowKind::Fill => {
                let flow = self.flows.fill_mut(tab).ok_or_else(|| no_flow(kind, tab))?;
                let effects = flow.step(event)?;
                (flow.id(), flow.state(), effects)
            }
        };

        self.trace(kind, tab, id, state, label, &effects);
        self.flows.purge_closed();
        self.execute(tab, id, effects).await
    }

    async fn execute(&mut self, tab: TabId, flow_id: FlowId, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Post { port, message } => self.post(port, message)?,
                Effect::ScheduleTimeout { after_ms } => self.scheduler.schedule(tab, flow_id, after_ms),
                Effect::ClearTimeout => self.scheduler.cancel(flow_id),
                Effect::Fill { port, object, remember } => self.fill(port, &object, remember).await?,
            }
        }
        Ok(())
    }

    fn post(&mut self, port: PortId, message: Message) -> Result<()> {
        if !self.ports.contains_key(&port) {
            return Err(AutofillError::invariant(
                "port_handler",
                format!("{} addressed to disconnected port {}", message.message_type, port),
            ));
        }
        debug!(port, message = %message.message_type, "posting");
        self.outbox.post(port, message)
    }

    /// Resolve `object` and send `fill.fill` to the content port. A failed
    /// decrypt is logged and nothing is filled.
    async fn fill(&mut self, port: PortId, object: &VaultObject, remember: bool) -> Result<()> {
        let url = self
            .ports
            .get(&port)
            .map(|p| p.url().to_string())
            .ok_or_else(|| AutofillError::invariant("port_handler", format!("fill for unknown port {}", port)))?;

        if remember {
            let key = strip_url_path(&url);
            if let Err(e) = self.collab.preferences.set_last_used(&key, &object.host, &object.id).await {
                warn!(error = %e, "could not record last used result");
            }
        }

        let values = match parse_result(self.collab.vault.as_ref(), object).await {
            Ok(values) => values,
            Err(e) => {
                warn!(host = %object.host, id = %object.id, error = %e, "could not resolve fill values");
                return Ok(());
            }
        };

        info!(port, fields = values.len(), "filling");
        let data = serde_json::to_value(values)?;
        self.post(port, Message::new(FlowKind::Fill, Action::Fill).with_data(data))
    }

    fn trace(&self, kind: FlowKind, tab: TabId, id: FlowId, state: FlowState, event: &str, effects: &[Effect]) {
        if let Some(tracer) = &self.tracer {
            tracer.log(
                &FlowTraceEvent::new(self.clock.now_ms(), tab, id, kind)
                    .with_state(state)
                    .with_event(event)
                    .with_effects(effects),
            );
        }
    }
}

fn require_tab(port: &PortInfo) -> Result<TabId> {
    port.tab_id()
        .ok_or_else(|| AutofillError::invariant("port_handler", format!("port {} has no tab", port.id)))
}

fn no_flow(kind: FlowKind, tab: TabId) -> AutofillError {
    AutofillError::protocol("port_handler", format!("no {} flow on tab {}", kind.as_str(), tab))
}

/// Submitted pairs from either a `SubmitData` object or a bare list of
/// `[name, value]` pairs. Non-empty `name`/`url` context is appended.
pub fn submitted_pairs(message: &Message) -> Result<Vec<(String, String)>> {
    if let Ok(submit) = message.data_as::<SubmitData>() {
        let mut pairs = submit.fields;
        if !submit.name.is_empty() {
            pairs.push(("name".to_string(), submit.name));
        }
        if !submit.url.is_empty() {
            pairs.push(("url".to_string(), submit.url));
        }
        return Ok(pairs);
    }
    message.data_as::<Vec<(String, String)>>()
}
