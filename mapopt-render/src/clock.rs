/*!
# Time Sources

Two clock abstractions drive the controller:

- [`Clock`]: a monotonic time source used for cooldowns, frame intervals and
  the scheduler's drain budget.
- [`FrameClock`]: the host's per-frame tick. Subscribers are called once per
  display refresh and unsubscribe through the returned [`FrameSubscription`].

Manual implementations of both let tests and the simulator run the control
loop deterministically.
*/

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::new();
        clock.set(start);
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, at: Duration) {
        self.micros.store(at.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Callback invoked once per frame
pub type FrameCallback = Box<dyn FnMut() + Send>;

/// Per-frame tick source supplied by the host
pub trait FrameClock {
    fn subscribe(&self, callback: FrameCallback) -> FrameSubscription;
}

/// Handle returned by [`FrameClock::subscribe`]. Cancelling (or dropping) it
/// stops further callbacks.
pub struct FrameSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FrameSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for FrameSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct FrameRegistry {
    next_id: u64,
    frames: u64,
    callbacks: Vec<(u64, FrameCallback)>,
    /// Ids cancelled while their callback was checked out by `fire`
    cancelled: HashSet<u64>,
}

/// Frame clock advanced explicitly with [`ManualFrameClock::fire`]
#[derive(Clone, Default)]
pub struct ManualFrameClock {
    registry: Arc<Mutex<FrameRegistry>>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live subscriber once. Returns the number of callbacks run.
    ///
    /// The registry lock is released while callbacks run, so a callback may
    /// subscribe or cancel (including itself) without deadlocking.
    pub fn fire(&self) -> usize {
        let mut callbacks = {
            let mut registry = self.registry.lock();
            registry.frames += 1;
            std::mem::take(&mut registry.callbacks)
        };

        let mut ran = 0;
        for (id, callback) in callbacks.iter_mut() {
            if self.registry.lock().cancelled.contains(id) {
                continue;
            }
            callback();
            ran += 1;
        }

        // Dropped after the lock is released; a callback may own a subscription
        let _removed: Vec<(u64, FrameCallback)> = {
            let mut registry = self.registry.lock();
            let cancelled = std::mem::take(&mut registry.cancelled);
            let (mut kept, removed): (Vec<_>, Vec<_>) =
                callbacks.into_iter().partition(|(id, _)| !cancelled.contains(id));
            kept.append(&mut registry.callbacks);
            registry.callbacks = kept;
            removed
        };
        ran
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    pub fn frames(&self) -> u64 {
        self.registry.lock().frames
    }
}

impl FrameClock for ManualFrameClock {
    fn subscribe(&self, callback: FrameCallback) -> FrameSubscription {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.push((id, callback));
            id
        };

        let registry: Weak<Mutex<FrameRegistry>> = Arc::downgrade(&self.registry);
        FrameSubscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                let _removed = {
                    let mut registry = registry.lock();
                    let position = registry.callbacks.iter().position(|(cb_id, _)| *cb_id == id);
                    match position {
                        Some(index) => Some(registry.callbacks.remove(index)),
                        None => {
                            registry.cancelled.insert(id);
                            None
                        }
                    }
                };
            }
        })
    }
}
