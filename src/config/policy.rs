//! Readiness policy and per-service profile.
//!
//! The policy is rebuilt from the environment on every readiness call and is
//! never cached, so changing the variables between calls takes effect
//! immediately.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Seconds to wait for the control device when the environment says nothing
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upper clamp for the timeout (ten minutes)
pub const MAX_TIMEOUT_SECS: u64 = 10 * 60;

pub const DEFAULT_LOADING_VAR: &str = "DEVGATE_MODULE_LOADING";
pub const DEFAULT_TIMEOUT_VAR: &str = "DEVGATE_MODULE_TIMEOUT";
pub const DEFAULT_DEVICE_PREFIX: &str = "/dev/";

#[cfg(target_os = "macos")]
pub const DEFAULT_LOADER: &str = "/sbin/kextload";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_LOADER: &str = "/sbin/modprobe";

/// Static description of one kernel service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceProfile {
    /// Prefix the service name is appended to (must carry its trailing separator)
    pub device_prefix: PathBuf,
    /// Device opened by the readiness probe; defaults to the device node
    pub control_device: Option<PathBuf>,
    /// Loader helper run with the service name as its only argument
    pub loader: PathBuf,
    /// Variable enabling on-demand loading
    pub loading_var: String,
    /// Variable holding the wait timeout in seconds
    pub timeout_var: String,
}

impl Default for ServiceProfile {
    fn default() -> Self {
        ServiceProfile {
            device_prefix: PathBuf::from(DEFAULT_DEVICE_PREFIX),
            control_device: None,
            loader: PathBuf::from(DEFAULT_LOADER),
            loading_var: DEFAULT_LOADING_VAR.to_string(),
            timeout_var: DEFAULT_TIMEOUT_VAR.to_string(),
        }
    }
}

impl ServiceProfile {
    /// Device node for `service`: the fixed prefix followed by the name.
    ///
    /// This is plain concatenation, not a path join, so an absolute service
    /// name can never escape the prefix.
    pub fn device_node(&self, service: &str) -> PathBuf {
        let mut node: OsString = self.device_prefix.clone().into_os_string();
        node.push(service);
        PathBuf::from(node)
    }

    pub fn control_device(&self, service: &str) -> PathBuf {
        self.control_device
            .clone()
            .unwrap_or_else(|| self.device_node(service))
    }
}

/// Load/timeout policy resolved for a single readiness call
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub load_enabled: bool,
    pub timeout_secs: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        ReadinessPolicy {
            load_enabled: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ReadinessPolicy {
    /// Read the policy from the process environment
    pub fn from_env(profile: &ServiceProfile) -> Self {
        Self::from_lookup(profile, |key| {
            std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
        })
    }

    /// Read the policy through an arbitrary variable lookup
    pub fn from_lookup<F>(profile: &ServiceProfile, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReadinessPolicy::default();
        let load_enabled = lookup(&profile.loading_var)
            .map(|v| parse_load_flag(&v))
            .unwrap_or(defaults.load_enabled);
        let timeout_secs = lookup(&profile.timeout_var)
            .map(|v| parse_timeout(&v))
            .unwrap_or(defaults.timeout_secs);

        ReadinessPolicy {
            load_enabled,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `YES...` or `ON...` in any case enables loading; everything else disables it
pub fn parse_load_flag(value: &str) -> bool {
    has_prefix_ignore_case(value, "YES") || has_prefix_ignore_case(value, "ON")
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    let value = value.as_bytes();
    value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Parse a timeout and clamp it into `[0, MAX_TIMEOUT_SECS]`
pub fn parse_timeout(value: &str) -> u64 {
    parse_integer_prefix(value).clamp(0, MAX_TIMEOUT_SECS as i64) as u64
}

/// Integer prefix parse with C `strtol(s, NULL, 0)` rules.
///
/// Leading whitespace and a sign are accepted, `0x` selects hex and a leading
/// `0` selects octal. Parsing stops at the first invalid digit; no digits at
/// all yields 0. Overflow saturates.
fn parse_integer_prefix(value: &str) -> i64 {
    let s = value.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let bytes = s.as_bytes();
    let (radix, digits) = if bytes.len() > 2
        && bytes[0] == b'0'
        && (bytes[1] == b'x' || bytes[1] == b'X')
        && bytes[2].is_ascii_hexdigit()
    {
        (16, &s[2..])
    } else if bytes.first() == Some(&b'0') {
        (8, s)
    } else {
        (10, s)
    };

    let mut magnitude: i64 = 0;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        magnitude = magnitude
            .saturating_mul(radix as i64)
            .saturating_add(digit as i64);
    }

    if negative {
        magnitude.saturating_neg()
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn policy_from(vars: &[(&str, &str)]) -> ReadinessPolicy {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReadinessPolicy::from_lookup(&ServiceProfile::default(), |k| vars.get(k).cloned())
    }

    #[test]
    fn unset_environment_yields_defaults() {
        let policy = policy_from(&[]);
        assert!(!policy.load_enabled);
        assert_eq!(policy.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn load_flag_accepts_yes_and_on_prefixes() {
        for value in ["YES", "yes", "Yes", "on", "ON", "yesplease", "online"] {
            assert!(parse_load_flag(value), "{value} should enable loading");
        }
        for value in ["", "no", "off", "Y", "O", "true", "1", " yes"] {
            assert!(!parse_load_flag(value), "{value:?} should not enable loading");
        }
    }

    #[test]
    fn timeout_is_clamped() {
        assert_eq!(parse_timeout("700"), 600);
        assert_eq!(parse_timeout("600"), 600);
        assert_eq!(parse_timeout("-5"), 0);
        assert_eq!(parse_timeout("0"), 0);
        assert_eq!(parse_timeout("99999999999999999999999"), 600);
    }

    #[test]
    fn timeout_follows_strtol_prefix_rules() {
        assert_eq!(parse_timeout("  42"), 42);
        assert_eq!(parse_timeout("42s"), 42);
        assert_eq!(parse_timeout("0x10"), 16);
        assert_eq!(parse_timeout("010"), 8);
        assert_eq!(parse_timeout("09"), 0);
        assert_eq!(parse_timeout("abc"), 0);
        assert_eq!(parse_timeout(""), 0);
        assert_eq!(parse_timeout("+3"), 3);
    }

    #[test]
    fn policy_reads_profile_variable_names() {
        let policy = policy_from(&[
            (DEFAULT_LOADING_VAR, "on"),
            (DEFAULT_TIMEOUT_VAR, "700"),
        ]);
        assert!(policy.load_enabled);
        assert_eq!(policy.timeout_secs, 600);
        assert_eq!(policy.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn device_node_concatenates_prefix() {
        let profile = ServiceProfile::default();
        assert_eq!(profile.device_node("zfs"), PathBuf::from("/dev/zfs"));
        assert_eq!(profile.device_node("/etc"), PathBuf::from("/dev//etc"));
        assert_eq!(profile.control_device("zfs"), PathBuf::from("/dev/zfs"));

        let profile = ServiceProfile {
            control_device: Some(PathBuf::from("/dev/zfsctl")),
            ..ServiceProfile::default()
        };
        assert_eq!(profile.control_device("zfs"), PathBuf::from("/dev/zfsctl"));
    }
}
