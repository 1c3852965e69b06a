use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{config::CaptureConfig, domain::CaptureFrame};

use super::{encoder::encode_jpeg_base64, CaptureError, DisplayProvider, FrameSource};

pub type FrameCallback = Arc<dyn Fn(CaptureFrame) + Send + Sync>;
pub type EndedCallback = Arc<dyn Fn() + Send + Sync>;

type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

#[derive(Default)]
struct LoopState {
    generation: u64,
    cancel: Option<CancellationToken>,
    source: Option<SharedSource>,
    handle: Option<JoinHandle<()>>,
}

pub struct CaptureLoop {
    provider: Arc<dyn DisplayProvider>,
    config: CaptureConfig,
    state: Arc<Mutex<LoopState>>,
    capturing: Arc<AtomicBool>,
}

impl CaptureLoop {
    pub fn new(provider: Arc<dyn DisplayProvider>, config: CaptureConfig) -> Self {
        Self {
            provider,
            config,
            state: Arc::new(Mutex::new(LoopState::default())),
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquires the display and schedules sampling. Permission failures are
    /// returned here and leave no timer behind.
    pub fn start(
        &self,
        on_frame: FrameCallback,
        on_ended: EndedCallback,
    ) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.cancel.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let source: SharedSource = Arc::new(Mutex::new(self.provider.acquire()?));
        let cancel = CancellationToken::new();
        state.generation += 1;

        let worker = Worker {
            generation: state.generation,
            source: source.clone(),
            config: self.config,
            cancel: cancel.clone(),
            state: self.state.clone(),
            capturing: self.capturing.clone(),
            on_frame,
            on_ended,
        };
        state.handle = Some(tokio::spawn(worker.run()));
        state.cancel = Some(cancel);
        state.source = Some(source);
        Ok(())
    }

    pub fn stop(&self) {
        if release(&self.state, &self.capturing, None) {
            tracing::info!(target: "capture", "screen capture stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn has_active_timer(&self) -> bool {
        self.state.lock().cancel.is_some()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        release(&self.state, &self.capturing, None);
    }
}

/// Tears down the running session. With `only_generation` set, a session
/// started after the caller's is left alone. Returns whether anything ran.
fn release(
    state: &Mutex<LoopState>,
    capturing: &AtomicBool,
    only_generation: Option<u64>,
) -> bool {
    let (cancel, source) = {
        let mut state = state.lock();
        if only_generation.is_some_and(|generation| generation != state.generation) {
            return false;
        }
        state.handle = None;
        (state.cancel.take(), state.source.take())
    };
    capturing.store(false, Ordering::SeqCst);

    let was_running = cancel.is_some();
    if let Some(cancel) = cancel {
        cancel.cancel();
    }
    if let Some(source) = source {
        source.lock().release();
    }
    was_running
}

struct Worker {
    generation: u64,
    source: SharedSource,
    config: CaptureConfig,
    cancel: CancellationToken,
    state: Arc<Mutex<LoopState>>,
    capturing: Arc<AtomicBool>,
    on_frame: FrameCallback,
    on_ended: EndedCallback,
}

impl Worker {
    async fn run(self) {
        let ready = tokio::select! {
            _ = self.cancel.cancelled() => return,
            ready = self.wait_until_ready() => ready,
        };
        let Some((width, height)) = ready else {
            tracing::warn!(target: "capture", "display ended before it became ready");
            self.end();
            return;
        };

        tracing::info!(
            target: "capture",
            width,
            height,
            interval_ms = self.config.interval.as_millis() as u64,
            "screen capture running"
        );
        self.capturing.store(true, Ordering::SeqCst);

        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.capture_once().await {
                        Ok(frame) if !self.cancel.is_cancelled() => (self.on_frame)(frame),
                        Ok(_) => break,
                        Err(CaptureError::SourceEnded) => {
                            tracing::info!(target: "capture", "display sharing ended by the user");
                            self.end();
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(target: "capture", error = %err, "frame skipped");
                        }
                    }
                }
            }
        }
    }

    async fn wait_until_ready(&self) -> Option<(u32, u32)> {
        loop {
            let source = self.source.clone();
            let readiness = tokio::task::spawn_blocking(move || {
                let source = source.lock();
                source.is_live().then(|| source.dimensions())
            })
            .await;

            match readiness {
                Ok(Some(Some(dimensions))) => return Some(dimensions),
                Ok(Some(None)) => sleep(self.config.readiness_poll).await,
                Ok(None) => return None,
                Err(err) => {
                    tracing::error!(target: "capture", error = %err, "readiness check failed");
                    return None;
                }
            }
        }
    }

    async fn capture_once(&self) -> Result<CaptureFrame, CaptureError> {
        let source = self.source.clone();
        let quality = self.config.jpeg_quality;
        let image_base64 = tokio::task::spawn_blocking(move || {
            let frame = {
                let mut source = source.lock();
                if !source.is_live() {
                    return Err(CaptureError::SourceEnded);
                }
                source.grab()?
            };
            encode_jpeg_base64(frame, quality)
        })
        .await??;

        Ok(CaptureFrame {
            image_base64,
            captured_at: Utc::now(),
        })
    }

    fn end(&self) {
        if release(&self.state, &self.capturing, Some(self.generation)) {
            (self.on_ended)();
        }
    }
}
