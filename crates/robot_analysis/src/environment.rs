// ==============================================================================
// Environment probe
// ==============================================================================
//
// The Python interpreter, its Robot Framework version, and the module search
// path are probed once at startup. Every disk-cache fingerprint embeds the
// probe so a cache written under one environment is never served under
// another.

use std::process::Command;

use sha2::{Digest, Sha256};

use robot_ast::RobotVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentProbe {
    pub python_executable: String,
    pub robot_version: RobotVersion,
    /// Hash over the interpreter's `sys.path`, so cache entries are keyed by
    /// where imports could come from, not just which interpreter ran.
    pub sys_path_hash: String,
}

impl EnvironmentProbe {
    /// Probe `python` for its Robot version and search path. Falls back to
    /// defaults when the interpreter is unavailable; a server without a
    /// working Python still analyzes resource files.
    pub fn probe(python: &str) -> Self {
        let script = "import sys\n\
                      try:\n    import robot\n    print(robot.version)\n\
                      except Exception:\n    print('')\n\
                      print('\\x1f'.join(sys.path))";
        let output = Command::new(python).arg("-c").arg(script).output();

        let (version, sys_path) = match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let mut lines = stdout.lines();
                let version = lines
                    .next()
                    .and_then(|v| v.trim().parse::<RobotVersion>().ok());
                let paths = lines.next().unwrap_or("").to_string();
                (version, paths)
            }
            _ => {
                log::warn!("could not probe python interpreter '{python}'");
                (None, String::new())
            }
        };

        let robot_version = version.unwrap_or_default();
        log::info!("environment: python={python} robot={robot_version}");

        Self {
            python_executable: python.to_string(),
            robot_version,
            sys_path_hash: hash_hex(sys_path.as_bytes()),
        }
    }

    /// A probe with explicit values; used by tests and by the
    /// `--robot-version` override.
    pub fn fixed(python: impl Into<String>, robot_version: RobotVersion) -> Self {
        Self {
            python_executable: python.into(),
            robot_version,
            sys_path_hash: hash_hex(b""),
        }
    }
}

/// Lowercase hex SHA-256, shared by every fingerprint field in the kernel.
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_probe_has_stable_hash() {
        let a = EnvironmentProbe::fixed("python3", RobotVersion::new(7, 0));
        let b = EnvironmentProbe::fixed("python3", RobotVersion::new(7, 0));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = hash_hex(b"hello");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(h, hash_hex(b"other"));
    }

    #[test]
    fn probe_of_missing_interpreter_falls_back() {
        let probe = EnvironmentProbe::probe("definitely-not-a-python");
        assert_eq!(probe.robot_version, RobotVersion::default());
    }
}
