//! Exclusive execution context and the suspend point around long waits.
//!
//! A host that runs one piece of caller logic at a time models that rule with
//! an [`ExecutionContext`]: whoever holds a [`ContextGuard`] may touch shared
//! state. [`ContextGuard::suspend`] hands the token back while a long wait runs
//! on its own task and takes it again before returning, so other cooperative
//! work keeps moving during the wait.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinError;

#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    token: Arc<Mutex<()>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the token and returns a guard holding it.
    pub async fn enter(&self) -> ContextGuard {
        let held = Arc::clone(&self.token).lock_owned().await;
        ContextGuard {
            context: self.clone(),
            held: Some(held),
        }
    }

    pub fn try_enter(&self) -> Option<ContextGuard> {
        let held = Arc::clone(&self.token).try_lock_owned().ok()?;
        Some(ContextGuard {
            context: self.clone(),
            held: Some(held),
        })
    }

    /// True while any guard holds the token.
    pub fn is_held(&self) -> bool {
        self.token.try_lock().is_err()
    }
}

/// Proof of holding the execution token.
///
/// Dropping the guard releases the token.
#[derive(Debug)]
pub struct ContextGuard {
    context: ExecutionContext,
    held: Option<OwnedMutexGuard<()>>,
}

impl ContextGuard {
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Runs `work` on a separate task with the token released.
    ///
    /// The token is taken back before this returns, whether `work` finished,
    /// failed, or panicked; a panic surfaces as the `JoinError`. If this
    /// future itself is dropped mid-wait the work keeps running detached and
    /// the guard stays released until [`ContextGuard::reacquire`].
    pub async fn suspend<F>(&mut self, work: F) -> Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.release();
        let worker = tokio::spawn(work);
        let outcome = worker.await;
        self.reacquire().await;
        outcome
    }

    /// Takes the token again if this guard released it. No-op while held.
    pub async fn reacquire(&mut self) {
        if self.held.is_none() {
            self.held = Some(Arc::clone(&self.context.token).lock_owned().await);
            tracing::trace!("execution context reacquired");
        }
    }

    fn release(&mut self) {
        if self.held.take().is_some() {
            tracing::trace!("execution context released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "current_thread")]
    async fn suspend_lets_other_task_enter_and_reacquires() {
        let context = ExecutionContext::new();
        let mut guard = context.enter().await;
        assert!(context.try_enter().is_none());

        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let other = {
            let context = context.clone();
            tokio::spawn(async move {
                let _guard = context.enter().await;
                let _ = entered_tx.send(());
            })
        };

        let value = guard
            .suspend(async move { entered_rx.await.is_ok() })
            .await
            .expect("worker should not panic");

        assert!(value, "other task should have entered during the wait");
        assert!(guard.is_held());
        assert!(context.is_held());
        other.await.expect("other task should finish");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn suspend_reacquires_after_worker_panic() {
        let context = ExecutionContext::new();
        let mut guard = context.enter().await;

        let outcome = guard
            .suspend(async {
                if true {
                    panic!("transport worker blew up");
                }
            })
            .await;

        assert!(outcome.expect_err("panic should surface").is_panic());
        assert!(guard.is_held());
        assert!(context.try_enter().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dropping_guard_releases_token() {
        let context = ExecutionContext::new();
        let guard = context.enter().await;
        drop(guard);

        let reentered = tokio::time::timeout(Duration::from_millis(100), context.enter()).await;
        assert!(reentered.is_ok());
    }
}
