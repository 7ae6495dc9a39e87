//! Types and Redis semantics shared by the verdict worker, API and CLI.

pub mod fixtures;
pub mod redis;
pub mod types;
