//! Result type for a remote command invocation.

use crate::channel::ExitReport;

/// Outcome of one remote command.
///
/// Created once at the end of a successful invocation and never mutated.
/// A non-zero [`status`](Self::status) is reported here, not as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    status: i32,
    stdout: String,
    stderr: String,
    status_known: bool,
    exit_signal: Option<String>,
}

impl ExecutionResult {
    /// Build a result from what the channel reported.
    ///
    /// - closed with an exit status: that status
    /// - closed without one (e.g. killed by a signal): `-1`
    /// - never reported closed: `0`, with [`is_status_known`](Self::is_status_known) false
    pub fn from_report(report: ExitReport, stdout: String, stderr: String) -> Self {
        let (status, status_known) = match (report.closed, report.exit_status) {
            (true, Some(code)) => (i32::try_from(code).unwrap_or(i32::MAX), true),
            (true, None) => (-1, false),
            (false, _) => (0, false),
        };

        Self {
            status,
            stdout,
            stderr,
            status_known,
            exit_signal: report.exit_signal,
        }
    }

    /// Exit status of the remote process.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error. Empty under a PTY, where the remote side
    /// merges both streams into stdout.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Whether the status is zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Whether the channel closed and reported an exit status.
    pub fn is_status_known(&self) -> bool {
        self.status_known
    }

    /// Signal that terminated the remote process, if any.
    pub fn exit_signal(&self) -> Option<&str> {
        self.exit_signal.as_deref()
    }

    /// Split into `(status, stdout, stderr)`.
    pub fn into_parts(self) -> (i32, String, String) {
        (self.status, self.stdout, self.stderr)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(closed: bool, exit_status: Option<u32>) -> ExitReport {
        ExitReport {
            closed,
            exit_status,
            exit_signal: None,
        }
    }

    #[test]
    fn test_status_from_closed_channel() {
        let result = ExecutionResult::from_report(report(true, Some(7)), String::new(), String::new());
        assert_eq!(result.status(), 7);
        assert!(result.is_status_known());
        assert!(!result.success());
    }

    #[test]
    fn test_status_defaults_to_zero_when_not_closed() {
        let result = ExecutionResult::from_report(report(false, Some(7)), "x\n".into(), String::new());
        assert_eq!(result.status(), 0);
        assert!(!result.is_status_known());
        assert!(result.success());
    }

    #[test]
    fn test_closed_without_status_after_signal() {
        let report = ExitReport {
            closed: true,
            exit_status: None,
            exit_signal: Some("KILL".into()),
        };
        let result = ExecutionResult::from_report(report, String::new(), String::new());
        assert_eq!(result.status(), -1);
        assert_eq!(result.exit_signal(), Some("KILL"));
        assert!(!result.is_status_known());
    }

    #[test]
    fn test_into_parts_and_display() {
        let result =
            ExecutionResult::from_report(report(true, Some(0)), "hello\n".into(), "warn\n".into());
        assert_eq!(result.to_string(), "hello\n");
        assert_eq!(
            result.into_parts(),
            (0, "hello\n".to_string(), "warn\n".to_string())
        );
    }
}
