//! Cursor-based polling loop (at-least-once).
//!
//! The cursor only moves past an update after the sink processed it. If the
//! sink fails, the rest of the batch is abandoned and the same update id is
//! requested again on the next poll. Permanent failures, and updates that keep
//! failing for `max_attempts` polls, are logged and skipped so one bad update
//! cannot stall every other chat.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Provider side of the loop: "give me everything from `offset` on".
#[async_trait]
pub trait UpdateSource: Send + Sync {
    type Update: Send + 'static;

    async fn fetch(&self, offset: Option<i64>) -> Result<Vec<Self::Update>>;

    fn update_id(update: &Self::Update) -> i64;
}

/// Bot side of the loop.
#[async_trait]
pub trait UpdateSink<U: Send + 'static>: Send + Sync {
    async fn process(&self, update: U) -> Result<()>;
}

/// Redelivery attempts before an update is given up on.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub struct Poller<S, H> {
    source: S,
    sink: H,
    interval: Duration,
    cursor: Option<i64>,
    max_attempts: u32,
    // (update id, failed attempts so far)
    failing: Option<(i64, u32)>,
}

impl<S, H> Poller<S, H>
where
    S: UpdateSource,
    H: UpdateSink<S::Update>,
{
    pub fn new(source: S, sink: H, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
            cursor: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            failing: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Next update id to request (`None` before the first successful update).
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// One fetch + process round. Returns how many updates were processed.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let batch = self.source.fetch(self.cursor).await?;
        let mut processed = 0usize;

        for update in batch {
            let id = S::update_id(&update);
            if self.cursor.is_some_and(|c| id < c) {
                continue; // already handled
            }

            match self.sink.process(update).await {
                Ok(()) => processed += 1,
                Err(e) if e.is_permanent() => {
                    tracing::error!(update_id = id, "update dropped: {e}");
                }
                Err(e) => {
                    let attempts = match self.failing {
                        Some((failed_id, n)) if failed_id == id => n + 1,
                        _ => 1,
                    };
                    if attempts < self.max_attempts {
                        self.failing = Some((id, attempts));
                        tracing::warn!(update_id = id, attempts, "update processing failed, will redeliver: {e}");
                        return Err(e);
                    }
                    tracing::error!(update_id = id, attempts, "update dropped after repeated failures: {e}");
                }
            }

            self.failing = None;
            self.cursor = Some(id + 1);
        }

        Ok(processed)
    }

    /// Run until `cancel` fires. Errors are logged and retried after the interval.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "polling started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.poll_once() => {
                    match res {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(processed = n, cursor = ?self.cursor, "poll round done"),
                        Err(e) => tracing::error!("poll round failed: {e}"),
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(cursor = ?self.cursor, "polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::errors::Error;

    #[derive(Clone, Default)]
    struct FakeSource {
        ids: Vec<i64>,
        offsets: Arc<Mutex<Vec<Option<i64>>>>,
    }

    #[async_trait]
    impl UpdateSource for FakeSource {
        type Update = i64;

        async fn fetch(&self, offset: Option<i64>) -> Result<Vec<i64>> {
            self.offsets.lock().unwrap().push(offset);
            Ok(self
                .ids
                .iter()
                .copied()
                .filter(|id| offset.map_or(true, |o| *id >= o))
                .collect())
        }

        fn update_id(update: &i64) -> i64 {
            *update
        }
    }

    #[derive(Clone, Default)]
    struct FlakySink {
        fail_once: Arc<Mutex<HashSet<i64>>>,
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl UpdateSink<i64> for FlakySink {
        async fn process(&self, update: i64) -> Result<()> {
            self.seen.lock().unwrap().push(update);
            if self.fail_once.lock().unwrap().remove(&update) {
                return Err(Error::External("send failed".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_update_is_requested_again() {
        let source = FakeSource {
            ids: vec![1, 2, 3],
            ..Default::default()
        };
        let sink = FlakySink::default();
        sink.fail_once.lock().unwrap().insert(2);

        let mut poller = Poller::new(source.clone(), sink.clone(), Duration::from_millis(1));

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor(), Some(2));

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(poller.cursor(), Some(4));

        assert_eq!(*source.offsets.lock().unwrap(), vec![None, Some(2)]);
        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 2, 2, 3]);
    }

    #[derive(Clone, Default)]
    struct BlockedChatSink {
        permanent: bool,
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl UpdateSink<i64> for BlockedChatSink {
        async fn process(&self, update: i64) -> Result<()> {
            self.seen.lock().unwrap().push(update);
            match update {
                1 if self.permanent => Err(Error::Rejected("Forbidden: bot was blocked by the user".to_string())),
                1 => Err(Error::External("timeout".to_string())),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn permanent_failure_does_not_block_later_updates() {
        let source = FakeSource {
            ids: vec![1, 2],
            ..Default::default()
        };
        let sink = BlockedChatSink {
            permanent: true,
            ..Default::default()
        };
        let mut poller = Poller::new(source, sink.clone(), Duration::from_millis(1));

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.cursor(), Some(3));
        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn update_failing_repeatedly_is_given_up_on() {
        let source = FakeSource {
            ids: vec![1, 2],
            ..Default::default()
        };
        let sink = BlockedChatSink::default();
        let mut poller = Poller::new(source, sink.clone(), Duration::from_millis(1)).with_max_attempts(3);

        assert!(poller.poll_once().await.is_err());
        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor(), None);

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.cursor(), Some(3));
        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 1, 1, 2]);
    }

    #[tokio::test]
    async fn stale_updates_below_cursor_are_skipped() {
        #[derive(Clone)]
        struct Replaying;

        #[async_trait]
        impl UpdateSource for Replaying {
            type Update = i64;
            async fn fetch(&self, _offset: Option<i64>) -> Result<Vec<i64>> {
                Ok(vec![5, 6])
            }
            fn update_id(update: &i64) -> i64 {
                *update
            }
        }

        let sink = FlakySink::default();
        let mut poller = Poller::new(Replaying, sink.clone(), Duration::from_millis(1));
        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert_eq!(*sink.seen.lock().unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let source = FakeSource {
            ids: vec![1],
            ..Default::default()
        };
        let sink = FlakySink::default();
        let poller = Poller::new(source, sink.clone(), Duration::from_millis(5));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Processed exactly once even though several polls ran.
        assert_eq!(*sink.seen.lock().unwrap(), vec![1]);
    }
}
