use std::sync::Arc;
use tokio::sync::watch;

/// Stop flag shared by the hub worker, the event handler and the signal handler. Triggering
/// any clone stops them all, and a clone taken after the trigger starts out stopped.
#[derive(Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Resolves once the flag is set, straight away if it already was.
    pub async fn recv(&mut self) {
        // Every clone holds the sender, so this can't fail while we're waiting on it.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn clones_hear_the_trigger_and_remember_it() {
        let origin = Shutdown::new();
        let mut worker = origin.clone();
        let mut presenter = origin.clone();

        origin.trigger();
        worker.recv().await;
        presenter.recv().await;
        worker.recv().await;
    }

    #[tokio::test]
    async fn late_clones_start_stopped() {
        let origin = Shutdown::new();
        let mut early = origin.clone();
        let waiting = timeout(Duration::from_millis(20), early.recv()).await;
        assert!(waiting.is_err());

        origin.trigger();
        let mut late = origin.clone();
        timeout(Duration::from_secs(1), late.recv()).await.unwrap();
    }
}
