//! Background refresh behind a stale-while-revalidate hit.

use std::future::Future;

use tokio::task::JoinHandle;

/// Handle to a detached refresh.
///
/// Dropping the handle detaches the task; it still runs to completion. Its
/// failures are logged inside the task and never reach the caller.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<()>,
}

impl Revalidation {
    pub(crate) fn spawn<F>(refresh: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { handle: tokio::spawn(refresh) }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the refresh to finish.
    pub async fn settled(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "revalidation task did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_settled_waits_for_task() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let revalidation = Revalidation::spawn(async move {
            tokio::task::yield_now().await;
            flag.store(true, Ordering::SeqCst);
        });

        revalidation.settled().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(Revalidation::spawn(async move {
            let _ = tx.send(());
        }));

        assert!(rx.await.is_ok());
    }
}
