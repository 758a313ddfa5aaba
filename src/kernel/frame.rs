// Suspension protocol — the running coroutine's view of the scheduler.
//
// A body receives a Frame, calls `begin` to find its resume point, runs
// one segment, and parks itself (yield / sleep / suspend / contended
// lock) before returning. Falling off the end instead re-arms the body
// to run from the top on its next turn, so a body with no suspension
// points just repeats every pass.

use crate::kernel::coroutine::{Anchor, CorId, State};
use crate::kernel::mutex::Mutex;
use crate::kernel::scheduler::{Scheduler, SpawnError};

/// How a coroutine hands the CPU back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Park {
    /// Runnable again on the next round-robin pass.
    Ready,
    /// Asleep until the given number of milliseconds has elapsed.
    Waiting(u32),
    /// Waiting on a mutex; re-entered each turn to retry.
    Blocked,
    /// Paused until another task (or the host) resumes it.
    Suspended,
}

/// Handle to the scheduler passed into a running body.
pub struct Frame<'s> {
    pub(crate) sched: &'s mut Scheduler,
    pub(crate) id: CorId,
}

impl Frame<'_> {
    /// First call of every body: returns the anchor recorded at the
    /// previous suspension point, or [`Anchor::START`] on a fresh entry.
    /// The body matches on the result to jump to its resume arm.
    pub fn begin(&mut self) -> Anchor {
        let slot = self.sched.slot_mut(self.id);
        match slot.anchor {
            Some(anchor) => anchor,
            None => {
                slot.anchor = Some(Anchor::START);
                Anchor::START
            }
        }
    }

    /// Park the coroutine, recording where its next entry resumes.
    /// The body must return right afterwards; the segment is over.
    pub fn park(&mut self, resume: Anchor, how: Park) {
        let (state, timeout) = match how {
            Park::Ready => (State::Ready, 0),
            Park::Waiting(ms) => (State::Waiting, ms),
            Park::Blocked => (State::Blocked, 0),
            Park::Suspended => (State::Suspended, 0),
        };
        let slot = self.sched.slot_mut(self.id);
        slot.anchor = Some(resume);
        slot.state = state;
        slot.timeout = timeout;
        slot.parked = true;
    }

    /// Give up the CPU for one round.
    pub fn yield_now(&mut self, resume: Anchor) {
        self.park(resume, Park::Ready);
    }

    /// Sleep for at least `ms` milliseconds.
    ///
    /// Waits of 100 ms and longer are shortened by one tick to cancel
    /// the round-down in the timeout decay; shorter waits stay exact.
    pub fn sleep(&mut self, ms: u32, resume: Anchor) {
        let ticks = if ms >= 100 { ms - 1 } else { ms };
        self.park(resume, Park::Waiting(ticks));
    }

    /// Pause until something calls resume for this task.
    pub fn suspend(&mut self, resume: Anchor) {
        self.park(resume, Park::Suspended);
    }

    /// Finish for good. The slot is never scheduled again (though
    /// `restart` can still revive it from the top).
    pub fn exit(&mut self) {
        let slot = self.sched.slot_mut(self.id);
        slot.state = State::Terminated;
        slot.timeout = 0;
        slot.parked = true;
    }

    /// Try to take `mutex`. On success the caller holds it and keeps
    /// going. On contention the coroutine blocks with `retry` as its
    /// resume point and must return; its next turns re-enter at `retry`
    /// so the attempt repeats until the lock is free.
    #[must_use]
    pub fn lock(&mut self, mutex: &Mutex, retry: Anchor) -> bool {
        if mutex.acquire(self.id) {
            return true;
        }
        self.park(retry, Park::Blocked);
        false
    }

    /// Release a held mutex. The caller is responsible for pairing this
    /// with its own successful `lock`.
    pub fn unlock(&mut self, mutex: &Mutex) {
        mutex.release(self.id);
    }

    /// Handle of the running coroutine.
    pub fn id(&self) -> CorId {
        self.id
    }

    // Operations on other tasks, usable mid-segment.

    pub fn suspend_task(&mut self, id: CorId) {
        self.sched.suspend(id);
    }

    pub fn resume_task(&mut self, id: CorId) {
        self.sched.resume(id);
    }

    pub fn restart_task(&mut self, id: CorId) {
        self.sched.restart(id);
    }

    pub fn terminate_task(&mut self, id: CorId) {
        self.sched.terminate(id);
    }

    /// Register a new task from inside a running one.
    pub fn spawn(
        &mut self,
        body: impl FnMut(&mut Frame<'_>) + 'static,
    ) -> Result<CorId, SpawnError> {
        self.sched.spawn(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scheduler::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sched(capacity: usize) -> Scheduler {
        Scheduler::new(capacity, || 0).unwrap()
    }

    #[test]
    fn begin_starts_fresh_then_returns_parked_anchor() {
        const SECOND: Anchor = Anchor(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut s = sched(1);
        let log = Rc::clone(&seen);
        s.spawn(move |cor| {
            let anchor = cor.begin();
            log.borrow_mut().push(anchor);
            cor.yield_now(SECOND);
        })
        .unwrap();
        s.dispatch();
        s.dispatch();
        assert_eq!(*seen.borrow(), [Anchor::START, SECOND]);
    }

    #[test]
    fn fall_off_end_reruns_from_the_top() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut s = sched(1);
        let log = Rc::clone(&seen);
        s.spawn(move |cor| {
            log.borrow_mut().push(cor.begin());
        })
        .unwrap();
        s.dispatch();
        s.dispatch();
        // no park committed, so the anchor resets between turns
        assert_eq!(*seen.borrow(), [Anchor::START, Anchor::START]);
    }

    #[test]
    fn exit_retires_the_task() {
        let mut s = sched(1);
        let id = s.spawn(|cor| cor.exit()).unwrap();
        s.dispatch();
        assert_eq!(s.state(id), State::Terminated);
        s.dispatch();
        assert_eq!(s.state(id), State::Terminated);
    }

    #[test]
    fn contended_lock_blocks_until_freed() {
        const GOT: Anchor = Anchor(1);
        let m = Rc::new(Mutex::new());
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut s = sched(2);

        // holder keeps the lock across one suspension
        let (m1, t1) = (Rc::clone(&m), Rc::clone(&trace));
        let holder = s
            .spawn(move |cor| match cor.begin() {
                GOT => {
                    t1.borrow_mut().push("holder-out");
                    cor.unlock(&m1);
                    cor.exit();
                }
                _ => {
                    assert!(cor.lock(&m1, Anchor::START));
                    t1.borrow_mut().push("holder-in");
                    cor.yield_now(GOT);
                }
            })
            .unwrap();

        let (m2, t2) = (Rc::clone(&m), Rc::clone(&trace));
        let waiter = s
            .spawn(move |cor| {
                if !cor.lock(&m2, Anchor::START) {
                    return;
                }
                t2.borrow_mut().push("waiter-in");
                cor.unlock(&m2);
                cor.exit();
            })
            .unwrap();

        s.dispatch(); // holder takes the lock
        s.dispatch(); // waiter loses, blocks
        assert_eq!(s.state(waiter), State::Blocked);
        s.dispatch(); // holder finishes and releases
        assert_eq!(s.state(holder), State::Terminated);
        s.dispatch(); // waiter retries and wins
        assert_eq!(s.state(waiter), State::Terminated);
        assert_eq!(*trace.borrow(), ["holder-in", "holder-out", "waiter-in"]);
        assert!(m.is_free());
    }
}
