//! Queue storage shared between producers and the queue worker.

pub mod provider;
pub mod store;
