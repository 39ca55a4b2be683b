use std::fmt;
use std::str::FromStr;

/// Robot Framework version in use, as probed from the external runtime.
///
/// Several token kinds only exist from a certain version on (`TRY`/`WHILE`
/// from 5.0, `CONFIG` from 6.0, `VAR` from 7.0); both the lexer and the
/// semantic token mapping consult this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RobotVersion {
    pub major: u16,
    pub minor: u16,
}

impl RobotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// TRY/EXCEPT/FINALLY/WHILE/BREAK/CONTINUE statements.
    pub fn has_try_while(self) -> bool {
        self.major >= 5
    }

    /// Language configuration headers.
    pub fn has_config(self) -> bool {
        self.major >= 6
    }

    /// The VAR statement.
    pub fn has_var(self) -> bool {
        self.major >= 7
    }
}

impl Default for RobotVersion {
    fn default() -> Self {
        Self::new(7, 0)
    }
}

impl fmt::Display for RobotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid Robot Framework version: {0}")]
pub struct InvalidVersion(String);

impl FromStr for RobotVersion {
    type Err = InvalidVersion;

    /// Accepts `"7"`, `"7.0"`, `"7.0.1"`, and `"7.0.1rc2"` style strings —
    /// anything past major.minor is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| InvalidVersion(s.to_string()))?;
        let minor = parts
            .next()
            .map(|p| {
                let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<u16>().unwrap_or(0)
            })
            .unwrap_or(0);
        Ok(Self { major, minor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_minor() {
        assert_eq!("7.1".parse::<RobotVersion>().unwrap(), RobotVersion::new(7, 1));
        assert_eq!("5".parse::<RobotVersion>().unwrap(), RobotVersion::new(5, 0));
    }

    #[test]
    fn parses_patch_and_rc_suffixes() {
        assert_eq!(
            "6.1.1".parse::<RobotVersion>().unwrap(),
            RobotVersion::new(6, 1)
        );
        assert_eq!(
            "7.0rc2".parse::<RobotVersion>().unwrap(),
            RobotVersion::new(7, 0)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-version".parse::<RobotVersion>().is_err());
    }

    #[test]
    fn feature_gates() {
        let rf4 = RobotVersion::new(4, 1);
        let rf5 = RobotVersion::new(5, 0);
        let rf7 = RobotVersion::new(7, 2);
        assert!(!rf4.has_try_while());
        assert!(rf5.has_try_while());
        assert!(!rf5.has_var());
        assert!(rf7.has_var() && rf7.has_config());
    }
}
