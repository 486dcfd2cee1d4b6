use std::sync::Arc;

use serde::Deserialize;

use crate::background::collaborators::SessionsStore;
use crate::background::memory::MemoryStores;
use crate::background::port_handler::{BackgroundEvent, PortHandler};
use crate::background::runtime::{ChannelOutbox, Clock, ManualClock, ManualScheduler, OutboundMessage, log_failure};
use crate::background::session_tools::invalid_sessions;
use crate::dom::parser::parse_html;
use crate::error::Result;
use crate::flows::flow_model::SavePolicy;
use crate::forms::form_model::ScannerOptions;
use crate::forms::scanner::PageScanner;
use crate::messages::message_model::Message;
use crate::messages::port::{PortId, PortInfo, TabId};
use crate::report::console::format_console_report;
use crate::report::report_model::ScanReport;
use crate::trace::logger::TraceLogger;
use crate::vault::client::MemoryVault;
use crate::vault::vault_model::{Session, Settings, VaultObject};

// ============================================================================
// scan subcommand
// ============================================================================

pub fn cmd_scan(
    file: Option<&str>,
    url: Option<&str>,
    format: &str,
    options: ScannerOptions,
    verbose: u8,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (html, page_url) = match (file, url) {
        (Some(path), _) => (std::fs::read_to_string(path)?, format!("file://{}", path)),
        (None, Some(url)) => {
            if verbose > 0 {
                eprintln!("Fetching {}...", url);
            }
            let body = reqwest::blocking::get(url)?.error_for_status()?.text()?;
            (body, url.to_string())
        }
        (None, None) => return Err("either --file or --url is required".into()),
    };

    let output = render_scan(&html, &page_url, format, options)?;
    print!("{}", output);
    Ok(())
}

/// Parse, scan and render a page as `text` or `json`.
pub fn render_scan(html: &str, url: &str, format: &str, options: ScannerOptions) -> Result<String> {
    let report = scan_report(html, url, options)?;
    match format {
        "json" => Ok(serde_json::to_string_pretty(&report)? + "\n"),
        _ => Ok(format_console_report(&report)),
    }
}

pub fn scan_report(html: &str, url: &str, options: ScannerOptions) -> Result<ScanReport> {
    let doc = parse_html(html, url)?;
    let mut scanner = PageScanner::new(options)?;
    let forms = scanner.scan_page(&doc)?;
    Ok(ScanReport::from_forms(&doc, forms))
}

// ============================================================================
// replay subcommand
// ============================================================================

/// Seeded collaborator state plus the channel events to feed the coordinator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplayScript {
    /// Clock value at the first step, ms since the epoch
    pub start_ms: u64,
    pub settings: Settings,
    pub sessions: Vec<Session>,
    pub objects: Vec<VaultObject>,
    pub ignore: Vec<String>,
    /// Hosts whose vault calls fail
    pub unreachable: Vec<String>,
    pub steps: Vec<ReplayStep>,
}

/// One script step. Set fields are applied in declaration order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplayStep {
    pub connect: Option<PortInfo>,
    pub message: Option<PortMessage>,
    pub disconnect: Option<PortId>,
    pub tab_removed: Option<TabId>,
    pub session_removed: Option<String>,
    /// Drop sessions that are expired or rejected by the vault
    pub check_sessions: bool,
    /// Move the clock forward, firing due timers
    pub advance_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortMessage {
    pub port: PortId,
    pub message: Message,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    pub outbound: Vec<OutboundMessage>,
    /// Events the coordinator rejected, in order
    pub errors: Vec<String>,
}

pub fn cmd_replay(
    script_path: &str,
    trace: Option<&str>,
    policy: SavePolicy,
    verbose: u8,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(script_path)?;
    let script: ReplayScript = serde_yaml::from_str(&content)?;
    if verbose > 0 {
        eprintln!("Replaying {} steps from {}...", script.steps.len(), script_path);
    }

    let tracer = trace.map(TraceLogger::new);
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let outcome = runtime.block_on(run_replay(script, policy, tracer))?;

    for message in &outcome.outbound {
        println!("{}", serde_json::to_string(message)?);
    }
    if !outcome.errors.is_empty() {
        eprintln!("{} events rejected:", outcome.errors.len());
        for error in &outcome.errors {
            eprintln!("  - {}", error);
        }
    }
    Ok(())
}

/// Feed `script` through a coordinator running on a manual clock.
pub async fn run_replay(
    script: ReplayScript,
    policy: SavePolicy,
    tracer: Option<TraceLogger>,
) -> Result<ReplayOutcome> {
    let vault = MemoryVault::with_objects(script.objects);
    for host in &script.unreachable {
        vault.set_unreachable(host).await;
    }
    let known_hosts: Vec<String> = script.sessions.iter().map(|s| s.host.clone()).collect();
    let stores = MemoryStores::new(vault, script.sessions, script.settings, script.ignore);

    let clock = Arc::new(ManualClock::new(script.start_ms));
    let scheduler = ManualScheduler::new(clock.clone());
    let (outbox, mut outbound) = ChannelOutbox::channel();
    let mut handler = PortHandler::new(
        stores.collaborators(),
        Box::new(outbox),
        Box::new(scheduler.clone()),
        clock.clone(),
        policy,
    )
    .with_known_hosts(known_hosts);
    if let Some(tracer) = tracer {
        handler = handler.with_tracer(tracer);
    }

    let mut outcome = ReplayOutcome::default();
    for step in script.steps {
        let mut events = Vec::new();
        if let Some(port) = step.connect {
            events.push(BackgroundEvent::Connect(port));
        }
        if let Some(PortMessage { port, message }) = step.message {
            events.push(BackgroundEvent::Message { port, message });
        }
        if let Some(port) = step.disconnect {
            events.push(BackgroundEvent::Disconnect { port });
        }
        if let Some(tab_id) = step.tab_removed {
            events.push(BackgroundEvent::TabRemoved { tab_id });
        }

        let mut sessions_changed = false;
        if let Some(host) = step.session_removed {
            stores.sessions.remove(&host);
            sessions_changed = true;
        }
        if step.check_sessions {
            for host in invalid_sessions(&stores.collaborators(), clock.now_ms()).await? {
                stores.sessions.remove(&host);
                sessions_changed = true;
            }
        }
        if sessions_changed {
            let hosts = stores.sessions.fetch().await?.into_keys().collect();
            events.push(BackgroundEvent::SessionsChanged { hosts });
        }

        feed(&mut handler, events, &mut outcome).await;

        if let Some(ms) = step.advance_ms {
            clock.advance(ms);
            feed(&mut handler, scheduler.due(), &mut outcome).await;
        }
        while let Ok(message) = outbound.try_recv() {
            outcome.outbound.push(message);
        }
    }
    Ok(outcome)
}

async fn feed(handler: &mut PortHandler, events: Vec<BackgroundEvent>, outcome: &mut ReplayOutcome) {
    for event in events {
        if let Err(e) = handler.handle(event).await {
            log_failure(&e);
            outcome.errors.push(e.to_string());
        }
    }
}
