// stackless coroutine kernel for small bare-metal targets

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod kernel;
