// Kernel module — stackless cooperative multitasking
//
// Coroutine bodies are plain closures that run one segment per dispatch
// and park themselves at explicit suspension points; the dispatcher
// multiplexes them over a single stack. No per-task stacks, no register
// switching, no preemption.
//
//   • `tick`      — wrap-safe adapter over the host millisecond tick
//   • `coroutine` — per-task records, states, anchors, handles
//   • `frame`     — the suspension protocol a running body speaks
//   • `scheduler` — task table, sleep timers, round-robin dispatcher
//   • `mutex`     — cooperative lock (bitmap word, polled on contention)

pub mod coroutine;
pub mod frame;
pub mod mutex;
pub mod scheduler;
pub mod tick;

pub use coroutine::{Anchor, Body, CorId, State};
pub use frame::{Frame, Park};
pub use mutex::Mutex;
pub use scheduler::{InitError, Scheduler, SpawnError, MAX_TASKS};
pub use tick::TickSource;
