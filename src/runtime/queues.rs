use std::cmp::Ordering;
use std::collections::VecDeque;

/// A scheduled `setTimeout`/`setInterval` callback
#[derive(Debug)]
pub struct TimerEntry<C> {
    pub id: u32,
    /// Requested delay in ms; only used for ordering
    pub delay: f64,
    pub task: C,
    pub cancelled: bool,
}

/// A scheduled `setImmediate` callback
#[derive(Debug)]
pub struct DeferredEntry<C> {
    pub id: u32,
    pub task: C,
    pub cancelled: bool,
}

/// Timer and deferred-callback queues of one isolate
///
/// Ids come from a single counter starting at 1, so id order is insertion
/// order. Timers are picked by `(delay, id)`; deferred entries run FIFO.
#[derive(Debug)]
pub struct EventQueues<C> {
    next_id: u32,
    timers: Vec<TimerEntry<C>>,
    deferred: VecDeque<DeferredEntry<C>>,
}

impl<C> EventQueues<C> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            timers: Vec::new(),
            deferred: VecDeque::new(),
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Schedule a timer. Negative and NaN delays count as 0.
    pub fn schedule_timer(&mut self, delay: f64, task: C) -> u32 {
        let delay = if delay.is_nan() { 0.0 } else { delay.max(0.0) };
        let id = self.allocate_id();
        self.timers.push(TimerEntry {
            id,
            delay,
            task,
            cancelled: false,
        });
        id
    }

    pub fn schedule_deferred(&mut self, task: C) -> u32 {
        let id = self.allocate_id();
        self.deferred.push_back(DeferredEntry {
            id,
            task,
            cancelled: false,
        });
        id
    }

    /// Mark a pending timer cancelled. Unknown ids are ignored.
    pub fn cancel_timer(&mut self, id: u32) {
        if let Some(timer) = self.timers.iter_mut().find(|t| t.id == id) {
            timer.cancelled = true;
        }
    }

    /// Mark a pending deferred entry cancelled. Unknown ids are ignored.
    pub fn cancel_deferred(&mut self, id: u32) {
        if let Some(entry) = self.deferred.iter_mut().find(|d| d.id == id) {
            entry.cancelled = true;
        }
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Next deferred entry in FIFO order, cancelled ones included
    pub fn pop_deferred(&mut self) -> Option<DeferredEntry<C>> {
        self.deferred.pop_front()
    }

    /// Remove and return the live timer with the smallest `(delay, id)`
    ///
    /// Cancelled timers are discarded along the way.
    pub fn pop_next_timer(&mut self) -> Option<TimerEntry<C>> {
        self.timers.retain(|t| !t.cancelled);

        let index = self
            .timers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| match a.delay.total_cmp(&b.delay) {
                Ordering::Equal => a.id.cmp(&b.id),
                ordering => ordering,
            })
            .map(|(index, _)| index)?;

        Some(self.timers.remove(index))
    }

    /// Drop every pending entry (and the tasks they hold)
    pub fn clear(&mut self) {
        self.timers.clear();
        self.deferred.clear();
    }
}

impl<C> Default for EventQueues<C> {
    fn default() -> Self {
        Self::new()
    }
}
