//! Device node access: existence checks, readiness probes and the control
//! channel.

use crate::config::types::{errno_of, DevgateError, Result};
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Outcome of a single readiness probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The device opened (and has already been closed again)
    Ready,
    /// The device does not exist yet
    Absent,
    /// Any other open failure; not worth retrying
    Failed(Errno),
}

/// Existence check only: does not open the node
pub fn node_exists(path: &Path) -> bool {
    access(path, AccessFlags::F_OK).is_ok()
}

/// Open the device read/write purely to test availability.
///
/// The handle is dropped before returning, so nothing stays open whatever the
/// outcome.
pub fn probe(path: &Path) -> ProbeOutcome {
    match open_rw(path) {
        Ok(_device) => ProbeOutcome::Ready,
        Err(err) => match errno_of(&err) {
            Errno::ENOENT => ProbeOutcome::Absent,
            errno => ProbeOutcome::Failed(errno),
        },
    }
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Open control channel to a kernel service.
///
/// Requests are forwarded as an opaque request code plus a caller-owned
/// command structure; the contents are never interpreted here.
#[derive(Debug)]
pub struct ControlHandle {
    device: File,
    path: PathBuf,
}

impl ControlHandle {
    /// Open an already-present control device
    pub fn open(path: &Path) -> Result<Self> {
        let device = open_rw(path)?;
        log::debug!("Opened control device {}", path.display());
        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Issue a control request on the open device.
    ///
    /// # Safety
    ///
    /// `request` must be a request code the driver answers by reading and/or
    /// writing at most `size_of::<T>()` bytes through the pointer it receives,
    /// and `T` must be valid for any bit pattern the driver writes.
    pub unsafe fn ioctl<T>(&self, request: libc::c_ulong, cmd: &mut T) -> Result<()> {
        // SAFETY: the fd is owned by `self.device` and open for the duration of
        // the call; the caller upholds the size/layout contract for `cmd`.
        let rc = libc::ioctl(self.device.as_raw_fd(), request as _, cmd as *mut T);
        Errno::result(rc)
            .map(drop)
            .map_err(DevgateError::Control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn node_exists_does_not_require_open_access() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("svc");
        assert!(!node_exists(&node));
        std::fs::write(&node, b"").unwrap();
        assert!(node_exists(&node));
        // A directory cannot be opened read/write but still exists.
        assert!(node_exists(dir.path()));
    }

    #[test]
    fn probe_classifies_open_results() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("svc");
        assert_eq!(probe(&node), ProbeOutcome::Absent);

        std::fs::write(&node, b"").unwrap();
        assert_eq!(probe(&node), ProbeOutcome::Ready);

        assert_eq!(probe(dir.path()), ProbeOutcome::Failed(Errno::EISDIR));
    }

    #[test]
    fn probe_through_missing_directory_is_not_absent() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(
            probe(&file.join("svc")),
            ProbeOutcome::Failed(Errno::ENOTDIR)
        );
    }

    #[test]
    fn control_handle_forwards_request_errors() {
        let handle = ControlHandle::open(Path::new("/dev/null")).unwrap();
        assert_eq!(handle.path(), Path::new("/dev/null"));

        let mut winsize: libc::winsize = unsafe { std::mem::zeroed() };
        let result = unsafe { handle.ioctl(libc::TIOCGWINSZ as libc::c_ulong, &mut winsize) };
        match result {
            Err(DevgateError::Control(errno)) => assert_eq!(errno, Errno::ENOTTY),
            other => panic!("expected ENOTTY, got {:?}", other),
        }
    }

    #[test]
    fn control_handle_open_reports_io_errors() {
        let dir = tempdir().unwrap();
        let result = ControlHandle::open(&dir.path().join("missing"));
        assert!(matches!(result, Err(DevgateError::Io(_))));
    }
}
