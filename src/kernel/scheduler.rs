// Round-robin dispatcher over a fixed table of stackless coroutines.
//
// One table slot per task; the slot index is the task's handle and
// never moves. Slot 0 is the idle coroutine, selected only when nothing
// else is runnable. Each dispatch cycle advances sleep timers, picks
// the next runnable slot after the current one, and runs that body for
// one segment.
//
// Everything happens on one execution context. None of this is safe to
// call from an interrupt handler.

use core::fmt;

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, info};

use crate::kernel::coroutine::{CorId, Slot, State};
use crate::kernel::frame::Frame;
use crate::kernel::tick::Ticker;

/// Most user coroutines a table can hold. One extra slot carries the
/// idle task, and the resulting 32 handles fit the mutex ownership
/// bitmap.
pub const MAX_TASKS: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Requested capacity outside `1..=MAX_TASKS`; carries the request.
    BadCapacity(usize),
    /// Task table allocation failed.
    OutOfMemory,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::BadCapacity(n) => write!(f, "capacity {n} not in 1..={MAX_TASKS}"),
            InitError::OutOfMemory => write!(f, "task table allocation failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every user slot is taken.
    TableFull,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TableFull => write!(f, "task table full"),
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

pub struct Scheduler {
    slots: Box<[Slot]>,
    /// Slot owning the execution context; the round-robin scan starts
    /// right after it.
    current: usize,
    ticker: Ticker,
}

impl Scheduler {
    /// Build a scheduler with `capacity` user slots plus the idle slot.
    /// Samples the tick source once as the elapsed-time baseline.
    pub fn new(
        capacity: usize,
        tick: impl FnMut() -> u32 + 'static,
    ) -> Result<Self, InitError> {
        if capacity == 0 || capacity > MAX_TASKS {
            return Err(InitError::BadCapacity(capacity));
        }
        let mut table = Vec::new();
        table
            .try_reserve_exact(capacity + 1)
            .map_err(|_| InitError::OutOfMemory)?;
        for _ in 0..capacity + 1 {
            table.push(Slot::vacant());
        }

        let mut sched = Scheduler {
            slots: table.into_boxed_slice(),
            current: 0,
            ticker: Ticker::new(Box::new(tick)),
        };

        // idle sits at slot 0 from day one; override via set_idle
        sched.slots[0].arm(Box::new(|_cor: &mut Frame<'_>| {}));
        sched.slots[0].state = State::Ready;

        info!("sched: up, {capacity} user slots");
        Ok(sched)
    }

    /// Register a coroutine body. The returned handle is the task's
    /// table slot and stays valid until the scheduler is dropped.
    /// Slots are handed out sequentially and never reused.
    pub fn spawn(
        &mut self,
        body: impl FnMut(&mut Frame<'_>) + 'static,
    ) -> Result<CorId, SpawnError> {
        let free = self
            .slots
            .iter()
            .position(|slot| slot.state == State::Free)
            .ok_or(SpawnError::TableFull)?;
        self.slots[free].arm(Box::new(body));
        let id = CorId(free as u8);
        debug!("sched: {id} armed");
        Ok(id)
    }

    /// Replace the idle body. Applications should install a low-power
    /// wait here; whatever runs must leave the scheduler live.
    pub fn set_idle(&mut self, body: impl FnMut(&mut Frame<'_>) + 'static) {
        let slot = &mut self.slots[CorId::IDLE.index()];
        slot.body = Some(Box::new(body));
        slot.state = State::Ready;
        slot.anchor = None;
        slot.parked = false;
        slot.timeout = 0;
    }

    /// Dispatch forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.dispatch();
        }
    }

    /// One dispatch cycle: pick up freshly created tasks, advance sleep
    /// timers, then run one segment of the next runnable coroutine.
    /// Public so hosts (and tests) can interleave their own work.
    pub fn dispatch(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.state == State::Created {
                slot.state = State::Ready;
            }
        }
        self.advance_timers();
        let id = self.select();
        self.enter(id);
    }

    // ── External task control ──────────────────────────────────

    /// Pause a task until `resume`. Its anchor survives, so it picks up
    /// where it left off. No effect on empty, freshly created or
    /// finished slots.
    pub fn suspend(&mut self, id: CorId) {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return;
        };
        if slot.state.suspendable() {
            slot.state = State::Suspended;
            slot.timeout = 0;
        }
    }

    /// Make a task runnable again, cancelling any pending sleep.
    /// No effect on empty or finished slots.
    pub fn resume(&mut self, id: CorId) {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return;
        };
        if slot.state.resumable() {
            slot.state = State::Ready;
            slot.timeout = 0;
        }
    }

    /// Rewind a task to the top of its body, waking it if parked.
    /// Works on any armed slot, including terminated ones.
    pub fn restart(&mut self, id: CorId) {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return;
        };
        if slot.state != State::Free {
            slot.state = State::Ready;
            slot.anchor = None;
            slot.timeout = 0;
        }
    }

    /// Retire a task permanently. Its slot is never handed out again.
    pub fn terminate(&mut self, id: CorId) {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return;
        };
        if !matches!(slot.state, State::Free | State::Terminated) {
            slot.state = State::Terminated;
            slot.timeout = 0;
            debug!("sched: {id} terminated");
        }
    }

    // ── Introspection ──────────────────────────────────────────

    /// Lifecycle state of a slot; `Free` for out-of-range handles.
    pub fn state(&self, id: CorId) -> State {
        self.slots
            .get(id.index())
            .map(|slot| slot.state)
            .unwrap_or(State::Free)
    }

    /// The slot owning the execution context (last dispatched).
    pub fn current(&self) -> CorId {
        CorId(self.current as u8)
    }

    /// User slots in the table (idle not counted).
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Armed user tasks, terminated ones included (idle not counted).
    pub fn task_count(&self) -> usize {
        self.slots[1..]
            .iter()
            .filter(|slot| slot.state != State::Free)
            .count()
    }

    // ── Internals ──────────────────────────────────────────────

    pub(crate) fn slot_mut(&mut self, id: CorId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    /// Drain one elapsed delta from every sleeping task. Tasks whose
    /// timer runs out all wake in the same pass, in table order.
    fn advance_timers(&mut self) {
        let elapsed = self.ticker.elapsed();
        for slot in self.slots.iter_mut() {
            if slot.state != State::Waiting {
                continue;
            }
            if slot.timeout > elapsed {
                slot.timeout -= elapsed;
            } else {
                slot.timeout = 0;
                slot.state = State::Ready;
            }
        }
    }

    /// Round-robin scan starting after the current slot, skipping idle;
    /// falls back to idle when nothing else is runnable.
    fn select(&mut self) -> CorId {
        let len = self.slots.len();
        let mut next = (self.current + 1) % len;
        for _ in 0..len {
            if next != 0 && self.slots[next].state.runnable() {
                self.current = next;
                return CorId(next as u8);
            }
            next = (next + 1) % len;
        }
        self.current = 0;
        CorId::IDLE
    }

    /// Run one segment of `id`'s body.
    fn enter(&mut self, id: CorId) {
        let index = id.index();
        {
            let slot = &mut self.slots[index];
            slot.state = State::Running;
            slot.parked = false;
            slot.timeout = 0;
        }

        let mut body = self.slots[index].body.take();
        if let Some(cb) = body.as_mut() {
            cb(&mut Frame {
                sched: &mut *self,
                id,
            });
        }

        let slot = &mut self.slots[index];
        if slot.body.is_none() {
            // keep a body swapped in mid-run (set_idle from idle itself)
            slot.body = body;
        }
        if !slot.parked {
            // fell off the end: next turn starts from the top
            slot.anchor = None;
            if slot.state == State::Running {
                slot.state = State::Ready;
            }
        }
    }
}
