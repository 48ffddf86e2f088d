//! Wait bounds and cancellation signals for lock acquisition

use std::future;
use std::time::Duration;

use tokio::sync::watch;

/// How long a lock request may wait for the current holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait until granted, cancelled, or the store closes.
    Infinite,
    /// Wait at most this long. `Duration::ZERO` fails at once on contention.
    After(Duration),
}

impl Timeout {
    /// Fail immediately if the key is held by someone else.
    pub const IMMEDIATE: Timeout = Timeout::After(Duration::ZERO);

    pub fn from_millis(millis: u64) -> Self {
        Timeout::After(Duration::from_millis(millis))
    }

    /// Returns true if the request must not wait at all.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Timeout::After(d) if d.is_zero())
    }

    /// Completes when the wait window has elapsed; never completes for
    /// `Infinite`.
    pub(crate) async fn expired(self) {
        match self {
            Timeout::Infinite => future::pending::<()>().await,
            Timeout::After(duration) => tokio::time::sleep(duration).await,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    sender: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: Some(self.sender.subscribe()),
        }
    }

    /// Signals cancellation to every token. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation signal passed to every store operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Completes once cancellation is signalled. Never completes if the
    /// source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return future::pending().await;
        };
        let mut receiver = receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return future::pending().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate() {
        assert!(Timeout::IMMEDIATE.is_immediate());
        assert!(Timeout::from_millis(0).is_immediate());
        assert!(!Timeout::from_millis(10).is_immediate());
        assert!(!Timeout::Infinite.is_immediate());
    }

    #[test]
    fn test_none_token_is_never_cancelled() {
        assert!(!CancelToken::none().is_cancelled());
    }

    #[test]
    fn test_cancel_is_observed_by_all_tokens() {
        let source = CancelSource::new();
        let a = source.token();
        let b = a.clone();
        source.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_completes_after_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        source.cancel();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("cancellation observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_source_does_not_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);
        let result = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(result.is_err());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_finite_timeout_expires() {
        tokio::time::timeout(Duration::from_secs(5), Timeout::from_millis(5).expired())
            .await
            .expect("bounded wait elapses");
    }
}
