// Per-coroutine bookkeeping: lifecycle state, resume anchor, sleep timer.
//
// Records are plain data. Selection, timeout decay and the suspension
// protocol live in the scheduler and frame modules; the predicates here
// are what those consult before acting on a slot.

use core::fmt;

use alloc::boxed::Box;

use crate::kernel::frame::Frame;

/// A coroutine body.
///
/// Runs one segment per dispatch: consult [`Frame::begin`], do some
/// work, park at a suspension point (or fall off the end, which re-arms
/// the body from the top) and return. A body must not loop without
/// parking; nothing can preempt it.
pub type Body = Box<dyn FnMut(&mut Frame<'_>)>;

/// Task handle: the table slot index, stable for the task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorId(pub u8);

impl CorId {
    /// The idle coroutine, installed at slot 0 by the scheduler.
    pub const IDLE: CorId = CorId(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cor{}", self.0)
    }
}

/// Resume point inside a coroutine body.
///
/// Bodies declare their own markers as consts and match on the value
/// returned by [`Frame::begin`]; the scheduler just stores the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor(pub u8);

impl Anchor {
    /// Entry point of a body that has never parked (or ran to its end).
    pub const START: Anchor = Anchor(0);
}

/// Coroutine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Slot never handed out.
    Free,
    /// Registered, not yet picked up by the dispatcher.
    Created,
    /// Runnable; waiting for its round-robin turn.
    Ready,
    /// Body currently executing. At most one slot at a time.
    Running,
    /// Lost a lock attempt; re-enters each turn to retry.
    Blocked,
    /// Asleep until its timeout decays to zero.
    Waiting,
    /// Paused externally until resumed.
    Suspended,
    /// Finished for good; never scheduled again.
    Terminated,
}

impl State {
    /// Eligible for the selection scan. Blocked tasks count; re-running
    /// them is what retries their pending lock attempt.
    pub(crate) const fn runnable(self) -> bool {
        matches!(self, State::Ready | State::Blocked)
    }

    // Suspend acts on anything live; empty, freshly created and
    // finished slots are left alone.
    pub(crate) const fn suspendable(self) -> bool {
        matches!(
            self,
            State::Ready | State::Running | State::Blocked | State::Waiting | State::Suspended
        )
    }

    // Resume nudges anything armed back to ready, even states that were
    // never parked.
    pub(crate) const fn resumable(self) -> bool {
        !matches!(self, State::Free | State::Terminated)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Free => "free",
            State::Created => "created",
            State::Ready => "ready",
            State::Running => "running",
            State::Blocked => "blocked",
            State::Waiting => "waiting",
            State::Suspended => "suspended",
            State::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// One task table entry.
pub(crate) struct Slot {
    /// `None` while vacant, and briefly while the body is executing
    /// (the dispatcher takes it out for the call).
    pub(crate) body: Option<Body>,
    pub(crate) state: State,
    /// Where the body resumes on its next entry; `None` means the top.
    pub(crate) anchor: Option<Anchor>,
    /// Set by every protocol call that commits a suspension this turn.
    /// A body that returns with it clear fell off its end.
    pub(crate) parked: bool,
    /// Remaining milliseconds while `Waiting`.
    pub(crate) timeout: u32,
}

impl Slot {
    pub(crate) const fn vacant() -> Self {
        Slot {
            body: None,
            state: State::Free,
            anchor: None,
            parked: false,
            timeout: 0,
        }
    }

    /// Hand the slot to a new task.
    pub(crate) fn arm(&mut self, body: Body) {
        self.body = Some(body);
        self.state = State::Created;
        self.anchor = None;
        self.parked = false;
        self.timeout = 0;
    }
}
