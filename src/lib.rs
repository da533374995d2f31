#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs, missing_debug_implementations)]
extern crate alloc;
mod construct;
mod error;
mod pool;

pub use construct::*;
pub use error::*;
pub use pool::*;
