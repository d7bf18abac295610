//! Fire-and-forget backup of fetched posts
//!
//! Successful fetches are handed to a background task over a bounded tokio
//! channel. The request path only ever does a non-blocking `try_send`, so a
//! slow or failing archiver cannot delay or fail a fetch.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::{FetchResult, MediaPost};

/// Default number of queued backup jobs before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Failure reported by an archiver
#[derive(Debug, Error)]
#[error("archive failed: {0}")]
pub struct ArchiveError(pub String);

/// Archives media posts to durable storage
#[async_trait]
pub trait MediaArchiver: Send + Sync {
    async fn archive(&self, posts: &[MediaPost]) -> Result<(), ArchiveError>;
}

/// Archiver that only logs what it would have stored
#[derive(Debug, Clone, Copy, Default)]
pub struct LogArchiver;

#[async_trait]
impl MediaArchiver for LogArchiver {
    async fn archive(&self, posts: &[MediaPost]) -> Result<(), ArchiveError> {
        let media: usize = posts.iter().map(|p| p.media().len()).sum();
        let author = posts.first().map(|p| p.author_username()).unwrap_or("-");
        info!(author, posts = posts.len(), media, "backup received posts");
        Ok(())
    }
}

/// Handle for queueing backup jobs to the background archive task
pub struct BackupDispatcher {
    sender: mpsc::Sender<Arc<FetchResult>>,
    worker: JoinHandle<()>,
}

impl BackupDispatcher {
    /// Spawns the background archive task; must be called inside a tokio runtime
    pub fn spawn(archiver: Arc<dyn MediaArchiver>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Arc<FetchResult>>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(result) = receiver.recv().await {
                match archiver.archive(&result.posts).await {
                    Ok(()) => debug!(posts = result.len(), "backup archived"),
                    Err(e) => warn!(error = %e, "backup failed"),
                }
            }
        });

        Self { sender, worker }
    }

    /// Queues `result` for archiving without waiting
    ///
    /// Returns `false` if the job was dropped because the queue is full or the
    /// worker has stopped.
    pub fn dispatch(&self, result: Arc<FetchResult>) -> bool {
        match self.sender.try_send(result) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("backup queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("backup worker stopped, dropping job");
                false
            }
        }
    }

    /// Stops accepting jobs and waits for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "backup worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MediaItem, MediaKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingArchiver {
        posts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MediaArchiver for CountingArchiver {
        async fn archive(&self, posts: &[MediaPost]) -> Result<(), ArchiveError> {
            self.posts.fetch_add(posts.len(), Ordering::SeqCst);
            if self.fail {
                return Err(ArchiveError("disk full".to_string()));
            }
            Ok(())
        }
    }

    fn sample() -> Arc<FetchResult> {
        let media = MediaItem::new(
            "k",
            MediaKind::Photo,
            Some("https://pbs.example/x.jpg".to_string()),
            None,
            None,
        )
        .unwrap();
        Arc::new(FetchResult::new(vec![
            MediaPost::new("1", "t", None, "alice", vec![media]).unwrap()
        ]))
    }

    #[tokio::test]
    async fn test_dispatched_jobs_are_archived() {
        let archiver = Arc::new(CountingArchiver {
            posts: AtomicUsize::new(0),
            fail: false,
        });
        let dispatcher = BackupDispatcher::spawn(archiver.clone(), 4);

        assert!(dispatcher.dispatch(sample()));
        assert!(dispatcher.dispatch(sample()));
        dispatcher.shutdown().await;

        assert_eq!(archiver.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_archive_errors_do_not_stop_worker() {
        let archiver = Arc::new(CountingArchiver {
            posts: AtomicUsize::new(0),
            fail: true,
        });
        let dispatcher = BackupDispatcher::spawn(archiver.clone(), 4);

        assert!(dispatcher.dispatch(sample()));
        assert!(dispatcher.dispatch(sample()));
        dispatcher.shutdown().await;

        assert_eq!(archiver.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        // current-thread runtime: the worker cannot drain until we yield
        let dispatcher = BackupDispatcher::spawn(Arc::new(LogArchiver), 1);

        assert!(dispatcher.dispatch(sample()));
        assert!(!dispatcher.dispatch(sample()));
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_log_archiver_accepts_empty_batch() {
        assert!(LogArchiver.archive(&[]).await.is_ok());
    }
}
