//! devgate: kernel service readiness and portable execute-by-name
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::device`]: Device node existence checks, readiness probes, control channel
//! - [`kernel::readiness`]: Load-then-wait protocol for a kernel service's control device
//!
//! ## Execution Control ([`exec`])
//! - [`exec::search_path`]: PATH search with shell fallback and deferred EACCES reporting
//! - [`exec::backend`]: Exec primitives (process replacement, launch-and-wait)
//!
//! ## Configuration & Policy ([`config`])
//! - [`config::policy`]: Environment-derived readiness policy and service profiles
//! - [`config::types`]: Error types and result aliases
//!
//! # Design Principles
//!
//! 1. **Policy is read, never cached** - Every readiness call rebuilds its policy
//! 2. **Only races are retried** - A missing device node is waited for; every other fault is final
//! 3. **Probes hold nothing** - The readiness probe closes its handle on every path
//! 4. **Most specific error wins** - A recorded permission failure beats "not found"
//! 5. **Minimal unsafe** - Confined to the control channel with explicit preconditions

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Configuration & Policy
pub mod config;

// CLI entrypoint wiring for the devgate binary.
pub mod cli;

pub use config::policy::{ReadinessPolicy, ServiceProfile};
pub use config::types::{DevgateError, LaunchError, ReadinessError, Result};
pub use exec::search_path::{execute_by_name, spawn_by_name};
pub use kernel::device::ControlHandle;
pub use kernel::readiness::{ensure_ready, ReadinessController, ReadyEvidence};
