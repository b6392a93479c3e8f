//! Queue worker split across focused submodules:
//! - `processor`: the trait implemented by item consumers
//! - `shared`: state shared between the dispatch loop and processing tasks
//! - `coordinator`: the worker lifecycle and dispatch loop
//! - `tests`: worker unit tests

pub mod coordinator;
pub mod processor;
mod shared;


pub use coordinator::QueueWorker;
pub use processor::{ItemProcessor, ProcessFuture};
