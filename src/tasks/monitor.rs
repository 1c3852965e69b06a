use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    api::TriggerBackend,
    capture::FrameCallback,
    domain::{CaptureFrame, Configuration, SessionStats},
};

use super::history::{CaptureHistory, CaptureRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Clear,
    Triggered(String),
    /// Evaluation failed; counters untouched.
    Skipped,
    /// Result arrived after the session stopped.
    Ignored,
}

pub struct Monitor {
    backend: Arc<dyn TriggerBackend>,
    configuration: Arc<Configuration>,
    stats: Mutex<SessionStats>,
    history: CaptureHistory,
    session: CancellationToken,
}

impl Monitor {
    pub fn new(
        backend: Arc<dyn TriggerBackend>,
        configuration: Arc<Configuration>,
        history_limit: usize,
    ) -> Self {
        Self {
            backend,
            configuration,
            stats: Mutex::new(SessionStats::default()),
            history: CaptureHistory::new(history_limit),
            session: CancellationToken::new(),
        }
    }

    // One task per frame; a slow evaluation never delays the next tick.
    pub fn on_frame(self: &Arc<Self>) -> FrameCallback {
        let monitor = Arc::clone(self);
        Arc::new(move |frame| {
            if monitor.session.is_cancelled() {
                return;
            }
            let monitor = monitor.clone();
            tokio::spawn(async move {
                monitor.handle_frame(frame).await;
            });
        })
    }

    pub async fn handle_frame(&self, frame: CaptureFrame) -> FrameOutcome {
        let config = &self.configuration;
        let evaluation = self
            .backend
            .evaluate_frame(&frame, &config.blocklist, &config.allowlist)
            .await;

        let triggers = match evaluation {
            Ok(triggers) => triggers,
            Err(err) => {
                tracing::warn!(
                    target: "monitor",
                    error = %err,
                    status = ?err.status(),
                    "evaluation failed; frame skipped"
                );
                return FrameOutcome::Skipped;
            }
        };

        let reason = triggers.first_triggered().map(str::to_string);
        let stats = {
            // stop() resets under this lock, so a cancelled session never counts again.
            let mut stats = self.stats.lock();
            if self.session.is_cancelled() {
                tracing::debug!(target: "monitor", "evaluation finished after stop; ignored");
                return FrameOutcome::Ignored;
            }
            stats.capture_count += 1;
            if reason.is_some() {
                stats.trigger_count += 1;
            }
            self.history.record(CaptureRecord {
                captured_at: frame.captured_at,
                image_bytes: frame.image_base64.len(),
                response: triggers,
                fired: reason.clone(),
            });
            *stats
        };

        let Some(reason) = reason else {
            tracing::debug!(target: "monitor", captures = stats.capture_count, "no trigger");
            return FrameOutcome::Clear;
        };

        tracing::info!(
            target: "monitor",
            %reason,
            captures = stats.capture_count,
            triggers = stats.trigger_count,
            "trigger fired"
        );
        if self.session.is_cancelled() {
            tracing::debug!(target: "monitor", %reason, "session stopped before delivery");
            return FrameOutcome::Ignored;
        }
        match self
            .backend
            .deliver_stimulus(config.stimulus_token(), &reason)
            .await
        {
            Ok(outcome) if outcome.success => {
                tracing::info!(target: "monitor", %reason, message = %outcome.message, "stimulus delivered");
            }
            Ok(outcome) => {
                tracing::warn!(target: "monitor", %reason, message = %outcome.message, "stimulus not delivered");
            }
            Err(err) => {
                tracing::warn!(target: "monitor", %reason, error = %err, "stimulus delivery failed");
            }
        }
        FrameOutcome::Triggered(reason)
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }

    pub fn history(&self) -> Vec<CaptureRecord> {
        self.history.snapshot()
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.session.is_cancelled()
    }

    pub fn stop(&self) {
        let mut stats = self.stats.lock();
        self.session.cancel();
        *stats = SessionStats::default();
        self.history.clear();
    }
}
