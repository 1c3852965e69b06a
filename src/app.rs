use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use crate::{
    api::{EvaluationClient, MockBackend, TriggerBackend},
    capture::{CaptureError, CaptureLoop, EndedCallback, PrimaryDisplay},
    config::AppConfig,
    domain::{Notice, Rule, RuleList, ShellEvent, ShellState},
    infrastructure::{
        directories::ResolvedPaths,
        shutdown::{Shutdown, StopReason},
        token_store::{mask, TokenStore},
    },
    tasks::monitor::Monitor,
};

const STATS_EVERY: Duration = Duration::from_secs(10);

pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!("screen-shock/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

#[derive(Debug, Clone, Default)]
pub struct MonitorRequest {
    pub description: String,
    pub token: Option<String>,
    pub allow: Vec<Rule>,
    pub block: Vec<Rule>,
    pub remove_allow: Vec<usize>,
    pub remove_block: Vec<usize>,
    pub debug: bool,
}

pub struct MonitorApp {
    config: Arc<AppConfig>,
    tokens: TokenStore,
    backend: Arc<dyn TriggerBackend>,
    shutdown: Shutdown,
}

impl MonitorApp {
    pub fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
        mock: bool,
    ) -> Result<Self> {
        let backend: Arc<dyn TriggerBackend> = if mock {
            tracing::warn!(target: "monitor", "using the offline mock backend; no proxy is contacted");
            Arc::new(MockBackend::new())
        } else {
            Arc::new(EvaluationClient::new(
                http_client()?,
                config.monitor.proxy_url.clone(),
            ))
        };
        Ok(Self {
            config: Arc::new(config),
            tokens: TokenStore::new(paths.token_path),
            backend,
            shutdown,
        })
    }

    pub async fn run(self, request: MonitorRequest) -> Result<()> {
        let MonitorApp {
            config,
            tokens,
            backend,
            shutdown,
        } = self;

        let mut state = ShellState::new(tokens.load()?);
        if let Some(token) = request.token.as_deref() {
            tokens.save(token)?;
            state = state.apply(ShellEvent::TokenEdited(token.trim().to_string()));
        }

        state = state.apply(ShellEvent::DescriptionSubmitted(request.description.clone()));
        if let Some(notice) = state.notice() {
            bail!(describe(notice));
        }

        tracing::info!(target: "monitor", description = state.description(), "generating configuration");
        state = match backend.generate_configuration(state.description()).await {
            Ok(draft) => state.apply(ShellEvent::ConfigurationGenerated(draft)),
            Err(err) => state.apply(ShellEvent::GenerationFailed(err.to_string())),
        };
        if let Some(notice) = state.notice() {
            bail!(describe(notice));
        }

        state = edit_rules(state, &request);
        log_rules(&state);

        let capture = CaptureLoop::new(Arc::new(PrimaryDisplay), config.monitor.capture);
        let on_ended: EndedCallback = {
            let shutdown = shutdown.clone();
            Arc::new(move || shutdown.trigger(StopReason::CaptureEnded))
        };

        state = state.apply(ShellEvent::MonitoringRequested);
        let monitor = loop {
            if let Some(notice) = state
                .notice()
                .filter(|notice| matches!(notice, Notice::Invalid(_)))
            {
                bail!(describe(notice));
            }
            let configuration = state
                .session()
                .cloned()
                .context("monitoring requested without a configuration")?;
            let monitor = Arc::new(Monitor::new(
                backend.clone(),
                configuration,
                config.monitor.history_limit,
            ));

            match capture.start(monitor.on_frame(), on_ended.clone()) {
                Ok(()) => break monitor,
                Err(CaptureError::PermissionDenied(message)) => {
                    tracing::warn!(target: "capture", %message, "screen sharing refused");
                    state = state.apply(ShellEvent::PermissionDenied(message));
                    if prompt_retry(&shutdown).await? {
                        state = state.apply(ShellEvent::Retry);
                    } else {
                        // The terminal has no configuration editor to return to: report
                        // the configuration page state so the run can be repeated.
                        state = state.apply(ShellEvent::Cancel);
                        tracing::info!(target: "monitor", page = ?state.page(), "monitoring cancelled");
                        log_rules(&state);
                        return Ok(());
                    }
                }
                Err(err) => return Err(err).context("failed to start screen capture"),
            }
        };

        tracing::info!(
            target: "monitor",
            token = %mask(state.token()),
            interval_ms = config.monitor.capture.interval.as_millis() as u64,
            "monitoring started"
        );

        let mut shutdown_listener = shutdown.subscribe();
        let mut stats_tick = tokio::time::interval(STATS_EVERY);
        stats_tick.tick().await;
        let reason = loop {
            tokio::select! {
                reason = shutdown_listener.notified() => break reason,
                _ = stats_tick.tick() => {
                    state = state.apply(ShellEvent::StatsUpdated(monitor.stats()));
                    let stats = state.stats();
                    tracing::info!(
                        target: "monitor",
                        captures = stats.capture_count,
                        triggers = stats.trigger_count,
                        capturing = capture.is_capturing(),
                        "session stats"
                    );
                }
            }
        };

        capture.stop();
        let stats = monitor.stats();
        tracing::info!(
            target: "monitor",
            ?reason,
            captures = stats.capture_count,
            triggers = stats.trigger_count,
            "monitoring stopped"
        );
        if request.debug {
            dump_history(&monitor);
        }
        monitor.stop();
        state = state.apply(ShellEvent::Stopped);
        tracing::debug!(target: "monitor", page = ?state.page(), "shell reset");
        Ok(())
    }
}

fn edit_rules(mut state: ShellState, request: &MonitorRequest) -> ShellState {
    // Indices refer to the generated lists, so remove from the back first.
    for (list, indices) in [
        (RuleList::Allow, &request.remove_allow),
        (RuleList::Block, &request.remove_block),
    ] {
        let mut indices = indices.clone();
        indices.sort_unstable();
        indices.dedup();
        for index in indices.into_iter().rev() {
            state = state.apply(ShellEvent::RuleRemoved(list, index));
        }
    }
    for rule in &request.allow {
        state = state.apply(ShellEvent::RuleAdded(RuleList::Allow, rule.clone()));
    }
    for rule in &request.block {
        state = state.apply(ShellEvent::RuleAdded(RuleList::Block, rule.clone()));
    }
    state
}

fn log_rules(state: &ShellState) {
    let Some(draft) = state.draft() else {
        return;
    };
    for (index, rule) in draft.allowlist.iter().enumerate() {
        tracing::info!(target: "monitor", index, website = %rule.website, intent = %rule.intent, "allow");
    }
    for (index, rule) in draft.blocklist.iter().enumerate() {
        tracing::info!(target: "monitor", index, website = %rule.website, intent = %rule.intent, "block");
    }
}

fn describe(notice: &Notice) -> String {
    match notice {
        Notice::Invalid(err) => err.to_string(),
        Notice::GenerationFailed(message) => format!("could not generate configuration: {message}"),
        Notice::PermissionDenied(message) => format!("screen sharing refused: {message}"),
    }
}

async fn prompt_retry(shutdown: &Shutdown) -> Result<bool> {
    eprintln!("Screen capture permission was denied. Type 'r' to retry or anything else to cancel:");
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut listener = shutdown.subscribe();
    tokio::select! {
        _ = listener.notified() => Ok(false),
        line = lines.next_line() => {
            let line = line.context("failed to read from stdin")?;
            Ok(matches!(
                line.as_deref().map(str::trim),
                Some("r") | Some("R") | Some("retry")
            ))
        }
    }
}

fn dump_history(monitor: &Monitor) {
    for record in monitor.history() {
        let response = serde_json::to_string(&record.response).unwrap_or_default();
        tracing::info!(
            target: "monitor",
            captured_at = %record.captured_at.to_rfc3339(),
            bytes = record.image_bytes,
            %response,
            fired = record.fired.as_deref().unwrap_or("-"),
            "capture"
        );
    }
}

pub fn show_token(tokens: &TokenStore) -> Result<()> {
    match tokens.load()? {
        Some(token) => println!("{} ({})", mask(&token), tokens.path().display()),
        None => println!("no token stored"),
    }
    Ok(())
}

pub fn set_token(tokens: &TokenStore, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        bail!("token must not be blank");
    }
    tokens.save(token)?;
    tracing::info!(target: "token", path = %tokens.path().display(), "token stored");
    Ok(())
}

pub fn clear_token(tokens: &TokenStore) -> Result<()> {
    if tokens.clear()? {
        tracing::info!(target: "token", "token removed");
    } else {
        tracing::info!(target: "token", "no token to remove");
    }
    Ok(())
}
