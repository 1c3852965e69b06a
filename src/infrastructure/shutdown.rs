use tokio::sync::watch;

/// Why the process is winding down. The first reason recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    CaptureEnded,
    Finished,
}

#[derive(Clone)]
pub struct Shutdown {
    sender: watch::Sender<Option<StopReason>>,
}

#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<StopReason>>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownListener) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, ShutdownListener { receiver })
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn trigger(&self, reason: StopReason) {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

impl ShutdownListener {
    pub async fn notified(&mut self) -> StopReason {
        loop {
            if let Some(reason) = *self.receiver.borrow_and_update() {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                return StopReason::Finished;
            }
        }
    }

    #[cfg(test)]
    pub fn reason(&self) -> Option<StopReason> {
        *self.receiver.borrow()
    }
}

pub fn install_signal_handlers(shutdown: Shutdown) {
    let ctrlc = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc.trigger(StopReason::Signal);
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let term = shutdown.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                term.trigger(StopReason::Signal);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_is_kept() {
        let (shutdown, mut listener) = Shutdown::new();
        let late = shutdown.subscribe();
        assert_eq!(listener.reason(), None);

        shutdown.trigger(StopReason::CaptureEnded);
        shutdown.trigger(StopReason::Signal);

        assert_eq!(listener.notified().await, StopReason::CaptureEnded);
        assert_eq!(late.reason(), Some(StopReason::CaptureEnded));
    }

    #[tokio::test]
    async fn waiting_listener_wakes_on_trigger() {
        let (shutdown, mut listener) = Shutdown::new();
        let waiter = tokio::spawn(async move { listener.notified().await });
        tokio::task::yield_now().await;

        shutdown.trigger(StopReason::Signal);
        assert_eq!(waiter.await.unwrap(), StopReason::Signal);
    }
}
