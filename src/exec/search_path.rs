//! Execute-by-name over a colon-separated search path
//!
//! Resolution rules:
//! - a name containing `/` is executed as given, without searching
//! - an empty name is not found
//! - empty search path entries (leading, trailing or doubled colons) mean `.`
//! - candidates longer than the platform path limit are skipped with a
//!   diagnostic on stderr, never truncated
//! - `ENOEXEC` retries the candidate through `/bin/sh`
//! - `EACCES` is remembered and only reported if no later entry succeeds

use crate::config::types::{LaunchError, LaunchResult};
use crate::exec::backend::{ExecBackend, ReplaceImage, SpawnAndWait};
use log::{debug, warn};
use nix::errno::Errno;
use std::convert::Infallible;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::process::ExitStatus;

/// Search path used when `PATH` is unset or empty
pub const DEFAULT_SEARCH_PATH: &str = "/usr/bin:/bin";

/// Interpreter for candidates the kernel refuses as `ENOEXEC`
pub const SHELL_PATH: &CStr = c"/bin/sh";

/// Largest candidate (including separator and terminator) that will be tried
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize;

/// Replace the current process with `name`, resolved through `PATH`.
///
/// Only returns on failure.
pub fn execute_by_name<N, A, E>(name: N, argv: &[A], envp: &[E]) -> LaunchResult<Infallible>
where
    N: AsRef<OsStr>,
    A: AsRef<OsStr>,
    E: AsRef<OsStr>,
{
    let search_path = search_path_from_env();
    execute_in_path(&mut ReplaceImage, name, &search_path, argv, envp)
}

/// Resolve `name` through `PATH`, run it as a child and wait for it
pub fn spawn_by_name<N, A, E>(name: N, argv: &[A], envp: &[E]) -> LaunchResult<ExitStatus>
where
    N: AsRef<OsStr>,
    A: AsRef<OsStr>,
    E: AsRef<OsStr>,
{
    let search_path = search_path_from_env();
    execute_in_path(&mut SpawnAndWait, name, &search_path, argv, envp)
}

/// `PATH` from the process environment, or the default list
pub fn search_path_from_env() -> OsString {
    search_path_or_default(std::env::var_os("PATH"))
}

/// An unset or empty search path means the default list
fn search_path_or_default(path: Option<OsString>) -> OsString {
    match path {
        Some(path) if !path.is_empty() => path,
        _ => OsString::from(DEFAULT_SEARCH_PATH),
    }
}

/// The process environment as `KEY=VALUE` entries
pub fn inherited_environment() -> Vec<OsString> {
    std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key;
            entry.push("=");
            entry.push(value);
            entry
        })
        .collect()
}

/// Resolve `name` against an explicit search path and run it with `backend`
pub fn execute_in_path<B, N, A, E>(
    backend: &mut B,
    name: N,
    search_path: &OsStr,
    argv: &[A],
    envp: &[E],
) -> LaunchResult<B::Success>
where
    B: ExecBackend,
    N: AsRef<OsStr>,
    A: AsRef<OsStr>,
    E: AsRef<OsStr>,
{
    let name = name.as_ref().as_bytes();
    let argv = to_cstrings(argv)?;
    let envp = to_cstrings(envp)?;
    let mut search = PathSearch::default();

    if name.contains(&b'/') {
        let candidate = to_cstring(name)?;
        return match search.attempt(backend, &candidate, &argv, &envp) {
            Step::Done(result) => result,
            Step::Next => Err(search.exhausted()),
        };
    }

    if name.is_empty() {
        return Err(LaunchError::NotFound);
    }
    // Rejects NUL in the name before any candidate is built.
    to_cstring(name)?;

    for entry in search_path.as_bytes().split(|b| *b == b':') {
        let entry: &[u8] = if entry.is_empty() { b"." } else { entry };

        let Some(candidate) = search.candidate(entry, name)? else {
            continue;
        };
        match search.attempt(backend, &candidate, &argv, &envp) {
            Step::Done(result) => return result,
            Step::Next => continue,
        }
    }

    Err(search.exhausted())
}

enum Step<T> {
    Done(LaunchResult<T>),
    Next,
}

/// Per-call search state
#[derive(Default)]
struct PathSearch {
    saw_eacces: bool,
}

impl PathSearch {
    /// `entry/name`, or `None` if it would not fit in a path buffer
    fn candidate(&self, entry: &[u8], name: &[u8]) -> LaunchResult<Option<CString>> {
        if entry.len() + name.len() + 2 > MAX_PATH_LEN {
            report_path_too_long(entry);
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(entry.len() + name.len() + 1);
        buf.extend_from_slice(entry);
        buf.push(b'/');
        buf.extend_from_slice(name);
        to_cstring(&buf).map(Some)
    }

    fn attempt<B: ExecBackend>(
        &mut self,
        backend: &mut B,
        candidate: &CStr,
        argv: &[CString],
        envp: &[CString],
    ) -> Step<B::Success> {
        let errno = match backend.exec(candidate, argv, envp) {
            Ok(success) => return Step::Done(Ok(success)),
            Err(errno) => errno,
        };
        debug!("exec {:?} failed: {}", candidate, errno);

        match errno {
            Errno::E2BIG => Step::Done(Err(LaunchError::TooBig)),
            Errno::ELOOP | Errno::ENAMETOOLONG | Errno::ENOENT | Errno::ENOTDIR => Step::Next,
            Errno::ENOEXEC => Step::Done(run_with_shell(backend, candidate, argv, envp)),
            Errno::ENOMEM => Step::Done(Err(LaunchError::OutOfMemory)),
            // Busy text files are not retried, matching sh(1).
            Errno::ETXTBSY => Step::Done(Err(LaunchError::Os(errno))),
            _ => {
                // EACCES may mean an inaccessible directory or a non-executable
                // file; stat tells them apart. The stat race is accepted.
                if !backend.probe(candidate) {
                    return Step::Next;
                }
                if errno == Errno::EACCES {
                    self.saw_eacces = true;
                    Step::Next
                } else {
                    Step::Done(Err(LaunchError::Os(errno)))
                }
            }
        }
    }

    fn exhausted(&self) -> LaunchError {
        if self.saw_eacces {
            LaunchError::PermissionDenied
        } else {
            LaunchError::NotFound
        }
    }
}

/// Re-run `candidate` as `sh candidate argv[1..]`
fn run_with_shell<B: ExecBackend>(
    backend: &mut B,
    candidate: &CStr,
    argv: &[CString],
    envp: &[CString],
) -> LaunchResult<B::Success> {
    let mut shell_argv = Vec::with_capacity(argv.len() + 1);
    shell_argv.push(CString::from(c"sh"));
    shell_argv.push(candidate.to_owned());
    shell_argv.extend(argv.iter().skip(1).cloned());

    debug!("Retrying {:?} through {:?}", candidate, SHELL_PATH);
    backend
        .exec(SHELL_PATH, &shell_argv, envp)
        .map_err(LaunchError::ExecFailed)
}

fn report_path_too_long(entry: &[u8]) {
    {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(b"execvP: ");
        let _ = stderr.write_all(entry);
        let _ = stderr.write_all(b": path too long\n");
    }
    warn!(
        "Skipping search path entry {}: path too long",
        String::from_utf8_lossy(entry)
    );
}

fn to_cstring(bytes: &[u8]) -> LaunchResult<CString> {
    CString::new(bytes).map_err(|_| {
        LaunchError::InvalidArgument(format!(
            "{} contains a NUL byte",
            String::from_utf8_lossy(bytes)
        ))
    })
}

fn to_cstrings<S: AsRef<OsStr>>(items: &[S]) -> LaunchResult<Vec<CString>> {
    items
        .iter()
        .map(|item| to_cstring(item.as_ref().as_bytes()))
        .collect()
}
