//! Task scheduler: a file-backed task store drained by a bounded worker pool.

pub mod api;
pub mod config;
pub mod error;
pub mod tasks;
pub mod worker;
