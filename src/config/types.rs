/// Core error types for the devgate system
use crate::config::policy::ServiceProfile;
use nix::errno::Errno;
use thiserror::Error;

/// Why a kernel service's control device could not be made ready
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("kernel module is not loaded")]
    ModuleNotLoaded,

    #[error("timed out waiting for the control device")]
    Timeout,

    #[error("module loader failed")]
    LoaderFailed,

    #[error("control device error: {0}")]
    DeviceError(Errno),
}

impl ReadinessError {
    /// OS error code conventionally reported for this failure
    pub fn errno(&self) -> Errno {
        match self {
            ReadinessError::ModuleNotLoaded => Errno::ENXIO,
            ReadinessError::Timeout => Errno::ENOENT,
            ReadinessError::LoaderFailed => Errno::ENOEXEC,
            ReadinessError::DeviceError(errno) => *errno,
        }
    }

    /// Human-readable remediation for the operator
    pub fn remediation(&self, service: &str, profile: &ServiceProfile) -> String {
        let loader = profile.loader.display();
        match self {
            ReadinessError::ModuleNotLoaded => format!(
                "The {service} modules are not loaded.\n\
                 Try running '{loader} {service}' as root to load them."
            ),
            ReadinessError::Timeout => format!(
                "{} is required.\n\
                 Try running 'udevadm trigger' as root.",
                profile.control_device(service).display()
            ),
            ReadinessError::LoaderFailed => format!(
                "The {service} modules cannot be auto-loaded.\n\
                 Try running '{loader} {service}' as root to manually load them."
            ),
            ReadinessError::DeviceError(Errno::EACCES) => format!(
                "Permission denied: the {service} utilities must be run as root."
            ),
            ReadinessError::DeviceError(errno) => {
                format!("Failed to initialize the {service} control library: {errno}.")
            }
        }
    }
}

/// Why a command could not be executed by name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("command not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("argument list too long")]
    TooBig,

    #[error("out of memory")]
    OutOfMemory,

    #[error("shell fallback failed: {0}")]
    ExecFailed(Errno),

    #[error("exec failed: {0}")]
    Os(Errno),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl LaunchError {
    pub fn errno(&self) -> Errno {
        match self {
            LaunchError::NotFound => Errno::ENOENT,
            LaunchError::PermissionDenied => Errno::EACCES,
            LaunchError::TooBig => Errno::E2BIG,
            LaunchError::OutOfMemory => Errno::ENOMEM,
            LaunchError::ExecFailed(errno) | LaunchError::Os(errno) => *errno,
            LaunchError::InvalidArgument(_) => Errno::EINVAL,
        }
    }
}

/// Crate-wide error for operations spanning readiness, launching and control I/O
#[derive(Error, Debug)]
pub enum DevgateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Readiness error: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Control request failed: {0}")]
    Control(Errno),
}

/// Errno behind an I/O error; errors without an OS code count as EIO
pub(crate) fn errno_of(err: &std::io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}

/// Result type for the readiness protocol
pub type ReadinessResult<T> = std::result::Result<T, ReadinessError>;

/// Result type for search-path launching
pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

/// Result type alias for devgate operations
pub type Result<T> = std::result::Result<T, DevgateError>;
