// ==============================================================================
// Cancellation tokens and worker scheduling
// ==============================================================================
//
// Analysis APIs take a `CancellationToken` explicitly and poll it at
// well-defined points (before keyword lookups, between imports, per statement
// during token generation) via `check()`. Request handlers hold the token in
// a `TaskHandle` so a superseding request can cancel the older one;
// `TaskTracker::cancel_all` covers shutdown and connection loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// The cooperative cancellation error. Not a domain error: requests ending
/// with it produce no response body and no diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

struct TokenInner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// Shared cancellation flag with a wait-with-timeout.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                flag: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.mutex.lock();
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep up to `timeout`, returning early (with `Err(Cancelled)`) when
    /// cancellation occurs. Used to throttle background work without making
    /// it uncancellable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.mutex.lock();
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.inner.condvar.wait_for(&mut guard, deadline - now);
        }
    }
}

/// A worker thread paired with the token that cancels it.
pub struct TaskHandle<T> {
    token: CancellationToken,
    join: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Set the cancel flag; the worker observes it at its next poll point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> thread::Result<T> {
        self.join.join()
    }
}

/// Run `f` on a worker thread, handing it a cancellation token the returned
/// handle controls.
pub fn run_in_thread<T, F>(f: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let join = thread::Builder::new()
        .name("robot-worker".to_string())
        .spawn(move || f(worker_token))
        .expect("failed to spawn worker thread");
    TaskHandle { token, join }
}

/// Tracks outstanding workers so they can all be cancelled on shutdown.
#[derive(Default)]
pub struct TaskTracker {
    tasks: Mutex<Vec<(CancellationToken, JoinHandle<()>)>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, f: F) -> CancellationToken
    where
        F: FnOnce(CancellationToken) -> () + Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let join = thread::Builder::new()
            .name("robot-worker".to_string())
            .spawn(move || f(worker_token))
            .expect("failed to spawn worker thread");
        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, j)| !j.is_finished());
        tasks.push((token.clone(), join));
        token
    }

    /// Cancel every tracked worker and wait up to `timeout` for them to
    /// finish. Workers still running afterwards are detached.
    pub fn cancel_all(&self, timeout: Duration) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for (token, _) in &tasks {
            token.cancel();
        }
        let deadline = Instant::now() + timeout;
        for (_, join) in tasks {
            while !join.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if join.is_finished() {
                let _ = join.join();
            } else {
                log::warn!("worker did not stop within the shutdown timeout");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_check_reflects_cancel() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn wait_timeout_returns_early_on_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let result = waiter.wait_timeout(Duration::from_secs(10));
            (result, started.elapsed())
        });
        thread::sleep(Duration::from_millis(30));
        token.cancel();
        let (result, elapsed) = handle.join().unwrap();
        assert_eq!(result, Err(Cancelled));
        assert!(elapsed < Duration::from_secs(5), "waited {elapsed:?}");
    }

    #[test]
    fn wait_timeout_expires_without_cancel() {
        let token = CancellationToken::new();
        assert!(token.wait_timeout(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn run_in_thread_forwards_cancellation() {
        let handle = run_in_thread(|token| {
            // Poll until cancelled.
            while token.check().is_ok() {
                thread::sleep(Duration::from_millis(2));
            }
            42
        });
        handle.cancel();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn tracker_cancels_everything() {
        let tracker = TaskTracker::new();
        for _ in 0..3 {
            tracker.spawn(|token| {
                let _ = token.wait_timeout(Duration::from_secs(30));
            });
        }
        let started = Instant::now();
        tracker.cancel_all(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
