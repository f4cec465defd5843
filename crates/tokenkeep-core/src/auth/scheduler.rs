use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    /// The timer elapsed and its callback is running
    Fired,
}

struct Slot {
    state: SchedulerState,
    /// Bumped by every arm/disarm so a stale timer can tell it lost the slot
    generation: u64,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

/// Single-shot renewal timer. At most one timer is armed at any time.
///
/// `arm` and `disarm` are the only mutators; arming replaces any previous
/// timer. Must be used from within a tokio runtime.
pub struct RefreshScheduler {
    slot: Arc<Mutex<Slot>>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: SchedulerState::Idle,
                generation: 0,
                deadline: None,
                task: None,
            })),
        }
    }

    /// Arm the timer to run `on_fire` after `delay`, cancelling any armed timer.
    pub fn arm<F, Fut>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        slot.generation += 1;

        let generation = slot.generation;
        let deadline = Instant::now() + delay;
        let shared = Arc::clone(&self.slot);

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if !Self::mark_fired(&shared, generation) {
                return;
            }
            debug!("Refresh timer fired");
            on_fire().await;
            Self::settle(&shared, generation);
        });

        slot.task = Some(task);
        slot.deadline = Some(deadline);
        slot.state = SchedulerState::Armed;
        debug!(delay_secs = delay.as_secs(), "Refresh timer armed");
    }

    /// Cancel the armed timer, if any.
    pub fn disarm(&self) {
        let mut slot = self.slot.lock();
        if let Some(task) = slot.task.take() {
            task.abort();
            debug!("Refresh timer cleared");
        }
        slot.generation += 1;
        slot.deadline = None;
        slot.state = SchedulerState::Idle;
    }

    pub fn state(&self) -> SchedulerState {
        self.slot.lock().state
    }

    pub fn is_armed(&self) -> bool {
        self.state() == SchedulerState::Armed
    }

    /// When the armed timer will fire.
    pub fn deadline(&self) -> Option<Instant> {
        self.slot.lock().deadline
    }

    fn mark_fired(slot: &Mutex<Slot>, generation: u64) -> bool {
        let mut slot = slot.lock();
        if slot.generation != generation {
            return false;
        }
        // Detach rather than abort: this task is the one running
        slot.task = None;
        slot.deadline = None;
        slot.state = SchedulerState::Fired;
        true
    }

    fn settle(slot: &Mutex<Slot>, generation: u64) {
        let mut slot = slot.lock();
        // The callback may have re-armed or disarmed; leave that state alone
        if slot.generation == generation {
            slot.state = SchedulerState::Idle;
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.slot.lock().task.take() {
            task.abort();
        }
    }
}
