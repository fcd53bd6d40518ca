//! Cooperative scheduling: a virtual-time timer queue plus debounce,
//! throttle and batching wrappers built on it.
//!
//! Everything runs on one thread. Deferred work only happens when the owner
//! drives the [`Scheduler`] with [`Scheduler::advance`] or
//! [`Scheduler::run_until_idle`], so "last write wins" is fully determined by
//! call order. Each wrapper owns a single pending-timer slot; sharing one
//! wrapper between call sites shares that slot.
//!
//! Timer callbacks hold weak references to their wrapper's state. Dropping a
//! wrapper cancels whatever it had pending.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use crate::clock::Clock;

/// Handle for cancelling a scheduled callback.
pub type TimerId = u64;

type Callback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedTimer {
    deadline: Duration,
    id: TimerId,
}

impl PartialOrd for QueuedTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest deadline first, then scheduling order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    next_id: TimerId,
    queue: BinaryHeap<QueuedTimer>,
    callbacks: HashMap<TimerId, Callback>,
}

/// Single-threaded event loop with virtual time. Clones share one loop.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Run `callback` once, `delay` after the current time.
    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now + delay;
        state.queue.push(QueuedTimer { deadline, id });
        state.callbacks.insert(id, Box::new(callback));
        log::trace!("timer {} scheduled for {:?}", id, deadline);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        self.state.borrow_mut().callbacks.remove(&id).is_some()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.state.borrow().callbacks.contains_key(&id)
    }

    /// Number of timers that have not fired or been cancelled.
    pub fn pending_count(&self) -> usize {
        self.state.borrow().callbacks.len()
    }

    /// Deadline of the next live timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        let mut state = self.state.borrow_mut();
        loop {
            let next = *state.queue.peek()?;
            if state.callbacks.contains_key(&next.id) {
                return Some(next.deadline);
            }
            // Cancelled entries are dropped lazily.
            state.queue.pop();
        }
    }

    fn pop_due(&self, target: Duration) -> Option<Callback> {
        let mut state = self.state.borrow_mut();
        loop {
            let next = *state.queue.peek()?;
            if next.deadline > target {
                return None;
            }
            state.queue.pop();
            if let Some(callback) = state.callbacks.remove(&next.id) {
                state.now = state.now.max(next.deadline);
                return Some(callback);
            }
        }
    }

    /// Move time forward to `target`, firing due timers in deadline order.
    ///
    /// Callbacks may schedule or cancel timers; new timers due before
    /// `target` fire in the same call. Returns the number of callbacks run.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;
        // The state borrow is released before each callback runs.
        while let Some(callback) = self.pop_due(target) {
            callback();
            fired += 1;
        }
        let mut state = self.state.borrow_mut();
        state.now = state.now.max(target);
        fired
    }

    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        self.advance_to(target)
    }

    /// Fire timers until none remain. A callback that always reschedules
    /// itself keeps this from returning.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while let Some(deadline) = self.next_deadline() {
            fired += self.advance_to(deadline);
        }
        fired
    }
}

impl Clock for Scheduler {
    fn now(&self) -> Duration {
        Scheduler::now(self)
    }
}

/// Holds a wrapper's user function.
///
/// The function is taken out of the slot while it runs, so it may call back
/// into its own wrapper. An invocation arriving while the function is already
/// running gets its arguments handed back instead of running.
struct CallbackSlot<A: 'static>(RefCell<Option<Box<dyn FnMut(A)>>>);

impl<A: 'static> CallbackSlot<A> {
    fn new(f: impl FnMut(A) + 'static) -> Self {
        Self(RefCell::new(Some(Box::new(f))))
    }

    /// Run the function, or return `args` when it is already running.
    fn invoke(&self, args: A) -> Option<A> {
        let Some(mut f) = self.0.borrow_mut().take() else {
            return Some(args);
        };
        f(args);
        *self.0.borrow_mut() = Some(f);
        None
    }

    fn is_running(&self) -> bool {
        self.0.borrow().is_none()
    }
}

// ============================================================================
// Debounce
// ============================================================================

struct DebounceState<A> {
    timer: Option<TimerId>,
    args: Option<A>,
}

struct DebounceInner<A: 'static> {
    scheduler: Scheduler,
    delay: Duration,
    state: RefCell<DebounceState<A>>,
    callback: CallbackSlot<A>,
}

impl<A: 'static> DebounceInner<A> {
    /// Replace any pending call with `args`, due `delay` from now.
    fn arm(self: &Rc<Self>, args: A) {
        let mut state = self.state.borrow_mut();
        if let Some(id) = state.timer.take() {
            self.scheduler.cancel(id);
        }
        state.args = Some(args);

        let weak = Rc::downgrade(self);
        let id = self.scheduler.schedule(self.delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.fire();
            }
        });
        state.timer = Some(id);
    }

    fn take_pending(&self) -> Option<A> {
        let mut state = self.state.borrow_mut();
        if let Some(id) = state.timer.take() {
            self.scheduler.cancel(id);
        }
        state.args.take()
    }

    fn fire(self: &Rc<Self>) {
        let Some(args) = self.take_pending() else {
            return;
        };
        // Re-entered from the running function: wait out another delay.
        if let Some(args) = self.callback.invoke(args) {
            self.arm(args);
        }
    }
}

/// Wrapper that runs its function only after `delay` passes without a new call.
pub struct Debounced<A: 'static> {
    inner: Rc<DebounceInner<A>>,
}

/// Debounce `f`: each call cancels the pending one and reschedules with the
/// latest arguments, so only the last call of a burst runs.
pub fn debounce<A, F>(scheduler: &Scheduler, delay: Duration, f: F) -> Debounced<A>
where
    A: 'static,
    F: FnMut(A) + 'static,
{
    Debounced {
        inner: Rc::new(DebounceInner {
            scheduler: scheduler.clone(),
            delay,
            state: RefCell::new(DebounceState {
                timer: None,
                args: None,
            }),
            callback: CallbackSlot::new(f),
        }),
    }
}

impl<A: 'static> Debounced<A> {
    pub fn call(&self, args: A) {
        self.inner.arm(args);
    }

    /// Run the pending call now instead of waiting.
    ///
    /// Called from inside the debounced function, the pending call is
    /// rescheduled instead.
    pub fn flush(&self) {
        self.inner.fire();
    }

    /// Drop the pending call. It will never run.
    pub fn cancel(&self) {
        self.inner.take_pending();
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().timer.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl<A: 'static> Drop for Debounced<A> {
    fn drop(&mut self) {
        self.inner.take_pending();
    }
}

// ============================================================================
// Throttle
// ============================================================================

struct ThrottleState<A> {
    window: Option<TimerId>,
    trailing: Option<A>,
}

struct ThrottleInner<A: 'static> {
    scheduler: Scheduler,
    limit: Duration,
    state: RefCell<ThrottleState<A>>,
    callback: CallbackSlot<A>,
}

impl<A: 'static> ThrottleInner<A> {
    fn open_window(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let id = self.scheduler.schedule(self.limit, move || {
            if let Some(inner) = weak.upgrade() {
                inner.close_window();
            }
        });
        self.state.borrow_mut().window = Some(id);
    }

    fn close_window(self: &Rc<Self>) {
        let trailing = {
            let mut state = self.state.borrow_mut();
            state.window = None;
            state.trailing.take()
        };
        if let Some(args) = trailing {
            self.open_window();
            self.run(args);
        }
    }

    /// Run the function inside an open window.
    fn run(&self, args: A) {
        if let Some(args) = self.callback.invoke(args) {
            // Re-entered from the running function; the window end delivers it.
            self.state.borrow_mut().trailing = Some(args);
        }
    }
}

/// Wrapper that runs its function at most once per `limit`.
pub struct Throttled<A: 'static> {
    inner: Rc<ThrottleInner<A>>,
}

/// Throttle `f`: the first call in a window runs immediately, later calls in
/// the window collapse into one trailing call with the latest arguments at
/// window end. A trailing call opens a new window of its own.
pub fn throttle<A, F>(scheduler: &Scheduler, limit: Duration, f: F) -> Throttled<A>
where
    A: 'static,
    F: FnMut(A) + 'static,
{
    Throttled {
        inner: Rc::new(ThrottleInner {
            scheduler: scheduler.clone(),
            limit,
            state: RefCell::new(ThrottleState {
                window: None,
                trailing: None,
            }),
            callback: CallbackSlot::new(f),
        }),
    }
}

impl<A: 'static> Throttled<A> {
    pub fn call(&self, args: A) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.window.is_some() {
                state.trailing = Some(args);
                return;
            }
        }
        // Open the window before running so re-entrant calls are throttled.
        self.inner.open_window();
        self.inner.run(args);
    }

    /// Run the trailing call now; the current window keeps running.
    pub fn flush(&self) {
        let trailing = self.inner.state.borrow_mut().trailing.take();
        if let Some(args) = trailing {
            self.inner.run(args);
        }
    }

    /// Drop any trailing call and close the window.
    pub fn cancel(&self) {
        let mut state = self.inner.state.borrow_mut();
        if let Some(id) = state.window.take() {
            self.inner.scheduler.cancel(id);
        }
        state.trailing = None;
    }

    /// Whether a trailing call is waiting for the window to end.
    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().trailing.is_some()
    }

    pub fn limit(&self) -> Duration {
        self.inner.limit
    }
}

impl<A: 'static> Drop for Throttled<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Batching
// ============================================================================

struct BatchState<T> {
    items: Vec<T>,
    timer: Option<TimerId>,
}

struct BatchInner<T: 'static> {
    scheduler: Scheduler,
    batch_size: usize,
    flush_delay: Duration,
    state: RefCell<BatchState<T>>,
    on_flush: CallbackSlot<Vec<T>>,
}

impl<T: 'static> BatchInner<T> {
    fn arm_timer(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let id = self.scheduler.schedule(self.flush_delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.state.borrow_mut().timer = None;
                inner.deliver();
            }
        });
        self.state.borrow_mut().timer = Some(id);
    }

    fn add(self: &Rc<Self>, update: T) {
        let (len, needs_timer) = {
            let mut state = self.state.borrow_mut();
            state.items.push(update);
            (state.items.len(), state.timer.is_none())
        };
        if len >= self.batch_size {
            self.deliver();
        } else if needs_timer {
            self.arm_timer();
        }
    }

    /// Hand pending items to `on_flush`, at most `batch_size` at a time.
    fn deliver(self: &Rc<Self>) {
        // Re-entered from on_flush: the running delivery picks these up.
        if self.on_flush.is_running() {
            return;
        }
        loop {
            let batch: Vec<T> = {
                let mut state = self.state.borrow_mut();
                if let Some(id) = state.timer.take() {
                    self.scheduler.cancel(id);
                }
                let n = state.items.len().min(self.batch_size);
                state.items.drain(..n).collect()
            };
            if batch.is_empty() {
                return;
            }

            log::debug!("delivering batch of {} updates", batch.len());
            let unsent = self.on_flush.invoke(batch);
            debug_assert!(unsent.is_none());

            // Updates added by on_flush itself: a full batch goes now, a
            // partial one waits for its timer.
            let (len, needs_timer) = {
                let state = self.state.borrow();
                (state.items.len(), state.timer.is_none())
            };
            if len < self.batch_size {
                if len > 0 && needs_timer {
                    self.arm_timer();
                }
                return;
            }
        }
    }

    fn clear(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(id) = state.timer.take() {
            self.scheduler.cancel(id);
        }
        state.items.clear();
    }
}

/// Collects updates and delivers them as one `Vec`, either once `batch_size`
/// items are pending or `flush_delay` after the first unflushed item,
/// whichever comes first.
///
/// `on_flush` may add more updates; they are batched the same way.
pub struct BatchUpdateHandler<T: 'static> {
    inner: Rc<BatchInner<T>>,
}

impl<T: 'static> BatchUpdateHandler<T> {
    /// `batch_size` of zero is treated as one.
    pub fn new<F>(scheduler: &Scheduler, batch_size: usize, flush_delay: Duration, on_flush: F) -> Self
    where
        F: FnMut(Vec<T>) + 'static,
    {
        Self {
            inner: Rc::new(BatchInner {
                scheduler: scheduler.clone(),
                batch_size: batch_size.max(1),
                flush_delay,
                state: RefCell::new(BatchState {
                    items: Vec::new(),
                    timer: None,
                }),
                on_flush: CallbackSlot::new(on_flush),
            }),
        }
    }

    pub fn add(&self, update: T) {
        self.inner.add(update);
    }

    /// Deliver pending items now. Does nothing when none are pending.
    pub fn flush(&self) {
        self.inner.deliver();
    }

    /// Discard pending items without delivering them.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.borrow().items.len()
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn flush_delay(&self) -> Duration {
        self.inner.flush_delay
    }
}

impl<T: 'static> Drop for BatchUpdateHandler<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
