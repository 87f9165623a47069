/*!
# Render Scheduler

Time-boxed execution of deferred render work. Tasks are queued with a
[`RenderPriority`]; each [`RenderScheduler::drain`] runs high-priority tasks
first (FIFO within a priority) until the queue is empty or the frame budget is
spent. The budget is checked before each task, so a pass may overrun by at most
one task. Work left over stays queued for the next frame.

A task that returns an error or panics ends the pass; the tasks behind it keep
their place in the queue.
*/

use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Deferred unit of render work
pub type RenderTask = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPriority {
    High,
    #[default]
    Normal,
}

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub frame_budget_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { frame_budget_ms: 8.0 }
    }
}

impl SchedulerConfig {
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(self.frame_budget_ms.max(0.0) / 1000.0)
    }
}

/// How a drain pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Queue emptied
    Completed,
    /// Budget spent with work remaining
    BudgetExhausted,
    /// A task failed; the rest of the pass was skipped
    TaskFailed,
    /// Another drain was already running
    Busy,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub remaining: usize,
    pub elapsed: Duration,
    pub outcome: DrainOutcome,
}

#[derive(Default)]
struct TaskQueues {
    high: VecDeque<RenderTask>,
    normal: VecDeque<RenderTask>,
}

impl TaskQueues {
    fn pop(&mut self) -> Option<RenderTask> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }
}

/// Clears the busy flag when a drain ends, including by unwinding
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Priority task queue drained under a time budget. Clones share the queue.
#[derive(Clone)]
pub struct RenderScheduler {
    queues: Arc<Mutex<TaskQueues>>,
    busy: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: Arc::new(Mutex::new(TaskQueues::default())),
            busy: Arc::new(AtomicBool::new(false)),
            clock,
        }
    }

    pub fn enqueue<F>(&self, task: F, priority: RenderPriority)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut queues = self.queues.lock();
        match priority {
            RenderPriority::High => queues.high.push_back(Box::new(task)),
            RenderPriority::Normal => queues.normal.push_back(Box::new(task)),
        }
        log::trace!("Queued {:?} render task ({} pending)", priority, queues.len());
    }

    /// Run queued tasks until the queue empties or `budget` has elapsed.
    ///
    /// Calling `drain` while another drain is running (for instance from
    /// inside a task) returns immediately with [`DrainOutcome::Busy`].
    pub fn drain(&self, budget: Duration) -> DrainReport {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return DrainReport {
                executed: 0,
                remaining: self.len(),
                elapsed: Duration::ZERO,
                outcome: DrainOutcome::Busy,
            };
        }
        let _guard = BusyGuard(&self.busy);

        let start = self.clock.now();
        let mut executed = 0;
        let outcome = loop {
            if self.clock.now().saturating_sub(start) > budget {
                break DrainOutcome::BudgetExhausted;
            }
            // The lock is released before the task runs so tasks may enqueue
            let next = self.queues.lock().pop();
            let Some(task) = next else {
                break DrainOutcome::Completed;
            };

            executed += 1;
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("Render task failed: {:#}", err);
                    break DrainOutcome::TaskFailed;
                }
                Err(_) => {
                    log::error!("Render task panicked");
                    break DrainOutcome::TaskFailed;
                }
            }
        };

        let remaining = self.len();
        let elapsed = self.clock.now().saturating_sub(start);
        if outcome == DrainOutcome::BudgetExhausted {
            log::debug!(
                "Frame budget {:?} spent after {} tasks, {} deferred",
                budget,
                executed,
                remaining
            );
        } else if outcome == DrainOutcome::TaskFailed && remaining > 0 {
            log::warn!("Skipped {} render tasks after a failure", remaining);
        }

        DrainReport {
            executed,
            remaining,
            elapsed,
            outcome,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending task without running it
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.queues.lock());
        if dropped.len() > 0 {
            log::debug!("Discarded {} pending render tasks", dropped.len());
        }
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("pending", &self.len())
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish()
    }
}
