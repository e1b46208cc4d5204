//! Kernel service readiness protocol
//!
//! Makes sure a service's device node exists (optionally running the loader
//! helper first) and then waits, bounded by the policy timeout, until the
//! control device can be opened.
//!
//! Device creation by the device manager is asynchronous relative to the
//! load, so waiting may be required. The wait busy-yields for a short budget
//! and then falls back to sleeping between probes.

use crate::config::policy::{ReadinessPolicy, ServiceProfile};
use crate::config::types::{ReadinessError, ReadinessResult, Result};
use crate::exec::search_path;
use crate::kernel::device::{self, ControlHandle, ProbeOutcome};
use log::{debug, info, warn};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// How long to yield-and-retry before falling back to sleeping
pub const BUSY_WAIT_BUDGET: Duration = Duration::from_millis(10);

/// Sleep between probes once the busy budget is spent
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for the wait loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitTiming {
    pub busy_budget: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitTiming {
    fn default() -> Self {
        WaitTiming {
            busy_budget: BUSY_WAIT_BUDGET,
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPhase {
    Busy,
    Sleep,
}

/// Per-call wait bookkeeping; lives on the caller's stack only
struct WaitState {
    start: Instant,
    phase: WaitPhase,
    probes: u32,
}

impl WaitState {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            phase: WaitPhase::Busy,
            probes: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn pause(&mut self, timing: &WaitTiming) {
        if self.elapsed() < timing.busy_budget {
            self.phase = WaitPhase::Busy;
            thread::yield_now();
        } else {
            if self.phase == WaitPhase::Busy {
                debug!("Busy budget spent after {} probes, polling", self.probes);
            }
            self.phase = WaitPhase::Sleep;
            thread::sleep(timing.poll_interval);
        }
    }
}

/// What a successful readiness call observed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadyEvidence {
    pub service: String,
    pub control_device: PathBuf,
    /// Device node was present before anything was done
    pub already_present: bool,
    pub loader_invoked: bool,
    pub probes: u32,
    pub final_phase: WaitPhase,
    pub elapsed_ms: u64,
}

/// Something able to load a kernel service on request
pub trait ModuleLoader {
    fn load(&self, service: &str) -> ReadinessResult<()>;
}

/// Runs an external loader helper and waits for it to exit
#[derive(Clone, Debug)]
pub struct ExternalLoader {
    program: PathBuf,
}

impl ExternalLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ModuleLoader for ExternalLoader {
    fn load(&self, service: &str) -> ReadinessResult<()> {
        let program = self.program.as_os_str();
        let argv = [program, OsStr::new(service)];
        let envp = search_path::inherited_environment();

        match search_path::spawn_by_name(program, &argv, &envp) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                warn!(
                    "Loader {} {} exited unsuccessfully: {}",
                    self.program.display(),
                    service,
                    status
                );
                Err(ReadinessError::LoaderFailed)
            }
            Err(e) => {
                warn!("Failed to run loader {}: {}", self.program.display(), e);
                Err(ReadinessError::LoaderFailed)
            }
        }
    }
}

/// Drives the readiness protocol for services described by one profile
pub struct ReadinessController<L = ExternalLoader> {
    profile: ServiceProfile,
    timing: WaitTiming,
    loader: L,
}

impl ReadinessController<ExternalLoader> {
    pub fn new(profile: ServiceProfile) -> Self {
        let loader = ExternalLoader::new(profile.loader.clone());
        Self {
            profile,
            timing: WaitTiming::default(),
            loader,
        }
    }
}

impl<L: ModuleLoader> ReadinessController<L> {
    /// Replace the loader
    pub fn with_loader<M: ModuleLoader>(self, loader: M) -> ReadinessController<M> {
        ReadinessController {
            profile: self.profile,
            timing: self.timing,
            loader,
        }
    }

    pub fn with_timing(mut self, timing: WaitTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    /// Run the protocol with the policy currently in the environment
    pub fn ensure_ready(&self, service: &str) -> ReadinessResult<ReadyEvidence> {
        let policy = ReadinessPolicy::from_env(&self.profile);
        self.ensure_ready_with(service, &policy)
    }

    /// Run the protocol for `service`, then open its control device
    pub fn connect(&self, service: &str) -> Result<ControlHandle> {
        self.ensure_ready(service)?;
        ControlHandle::open(&self.profile.control_device(service))
    }

    /// Run the protocol with an explicit policy
    pub fn ensure_ready_with(
        &self,
        service: &str,
        policy: &ReadinessPolicy,
    ) -> ReadinessResult<ReadyEvidence> {
        let node = self.profile.device_node(service);
        let already_present = device::node_exists(&node);
        let mut loader_invoked = false;

        if !already_present {
            if policy.load_enabled {
                info!(
                    "{} absent, loading {} via {}",
                    node.display(),
                    service,
                    self.profile.loader.display()
                );
                loader_invoked = true;
                self.loader.load(service)?;
            }

            if !device::node_exists(&node) {
                debug!("{} still absent, giving up", node.display());
                return Err(ReadinessError::ModuleNotLoaded);
            }
        }

        let control_device = self.profile.control_device(service);
        let timeout = policy.timeout();
        let mut state = WaitState::new();

        loop {
            state.probes += 1;
            match device::probe(&control_device) {
                ProbeOutcome::Ready => {
                    let evidence = ReadyEvidence {
                        service: service.to_string(),
                        control_device,
                        already_present,
                        loader_invoked,
                        probes: state.probes,
                        final_phase: state.phase,
                        elapsed_ms: state.elapsed().as_millis() as u64,
                    };
                    debug!("Control device ready: {:?}", evidence);
                    return Ok(evidence);
                }
                ProbeOutcome::Failed(errno) => {
                    warn!("Opening {} failed: {}", control_device.display(), errno);
                    return Err(ReadinessError::DeviceError(errno));
                }
                ProbeOutcome::Absent => {
                    if state.elapsed() >= timeout {
                        break;
                    }
                    state.pause(&self.timing);
                }
            }
        }

        warn!(
            "Timed out after {} probes waiting for {}",
            state.probes,
            control_device.display()
        );
        Err(ReadinessError::Timeout)
    }
}

/// Ensure `service` is ready using the default profile and the environment policy
pub fn ensure_ready(service: &str) -> ReadinessResult<()> {
    ReadinessController::new(ServiceProfile::default())
        .ensure_ready(service)
        .map(drop)
}
