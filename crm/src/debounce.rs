//! Quiet-period scheduling for validation that runs while a user types.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Scheduled { generation: u64 },
    Fired { generation: u64 },
    Cancelled { generation: u64 },
}

/// Runs only the most recently scheduled task, once the quiet period has
/// passed without another call to [`Debouncer::schedule`].
///
/// Must be used from inside a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    generation: u64,
    state: Arc<Mutex<DebounceState>>,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            generation: 0,
            state: Arc::new(Mutex::new(DebounceState::Idle)),
            pending: None,
        }
    }

    pub fn state(&self) -> DebounceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels whatever is pending and schedules `task`. Returns the
    /// generation number of the new run.
    pub fn schedule<F>(&mut self, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            DebounceState::Scheduled { generation };

        let state = Arc::clone(&self.state);
        let quiet = self.quiet;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            {
                let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
                if *current != (DebounceState::Scheduled { generation }) {
                    return;
                }
                *current = DebounceState::Fired { generation };
            }
            task.await;
        }));
        generation
    }

    /// Drops a pending run. A run that has already fired is left to finish.
    pub fn cancel(&mut self) {
        let Some(handle) = self.pending.take() else {
            return;
        };
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let DebounceState::Scheduled { generation } = *current {
            handle.abort();
            *current = DebounceState::Cancelled { generation };
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
