//! Execution control
//!
//! Resolves bare command names through the search path and hands the result
//! to an exec primitive (process replacement or launch-and-wait).

pub mod backend;
pub mod search_path;
