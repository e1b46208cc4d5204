//! Thin wrappers around kernel-facing primitives.
//!
//! `device` owns the raw node access (the only non-test `unsafe` is its
//! control request); `readiness` builds the load-then-wait protocol on top.

pub mod device;
pub mod readiness;
