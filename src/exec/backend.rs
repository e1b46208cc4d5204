//! Exec primitives used by the search-path launcher.
//!
//! The launcher only needs "try to run this exact path and tell me the errno
//! if it did not work". Process replacement satisfies that with
//! `Success = Infallible`; launch-and-wait satisfies it with the child's exit
//! status.

use crate::config::types::errno_of;
use nix::errno::Errno;
use nix::sys::stat::stat;
use std::convert::Infallible;
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus};

pub trait ExecBackend {
    /// What a successful execution yields
    type Success;

    /// Execute `path` with `argv`/`envp` (`envp` entries are `KEY=VALUE`)
    fn exec(
        &mut self,
        path: &CStr,
        argv: &[CString],
        envp: &[CString],
    ) -> Result<Self::Success, Errno>;

    /// File-status probe used to disambiguate exec failures
    fn probe(&self, path: &CStr) -> bool {
        stat(path).is_ok()
    }
}

/// `execve(2)`: on success the caller's image is gone
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplaceImage;

impl ExecBackend for ReplaceImage {
    type Success = Infallible;

    fn exec(&mut self, path: &CStr, argv: &[CString], envp: &[CString]) -> Result<Infallible, Errno> {
        nix::unistd::execve(path, argv, envp)
    }
}

/// Launch the program as a child and wait for it to exit
#[derive(Clone, Copy, Debug, Default)]
pub struct SpawnAndWait;

impl ExecBackend for SpawnAndWait {
    type Success = ExitStatus;

    fn exec(&mut self, path: &CStr, argv: &[CString], envp: &[CString]) -> Result<ExitStatus, Errno> {
        let mut command = Command::new(OsStr::from_bytes(path.to_bytes()));
        if let Some(arg0) = argv.first() {
            command.arg0(OsStr::from_bytes(arg0.to_bytes()));
        }
        command.args(argv.iter().skip(1).map(|a| OsStr::from_bytes(a.to_bytes())));

        command.env_clear();
        for entry in envp {
            let entry = entry.to_bytes();
            match entry.iter().position(|b| *b == b'=') {
                Some(eq) => {
                    command.env(
                        OsStr::from_bytes(&entry[..eq]),
                        OsStr::from_bytes(&entry[eq + 1..]),
                    );
                }
                None => log::debug!(
                    "Dropping malformed environment entry {:?}",
                    String::from_utf8_lossy(entry)
                ),
            }
        }

        command.status().map_err(|e| errno_of(&e))
    }
}
