//! GPIO helper execution utilities.
//!
//! Pin access on the gate controller goes through small CLI helpers
//! (`raspi-gpio`, `pigs`). This module runs them without a shell, captures
//! their output and enforces a hard upper bound on how long a single
//! invocation may take; a helper that exceeds it is killed.
//!
//! # Example
//!
//! ```ignore
//! use gpio_watchdog_common::shell::{self, RASPI_GPIO_CMD};
//! use std::time::Duration;
//!
//! let result = shell::exec(RASPI_GPIO_CMD, &["get", "4"], Duration::from_secs(1)).await?;
//! if result.success() {
//!     println!("Output: {}", result.stdout);
//! }
//! ```

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{GpioError, GpioResult};

/// Path to the `raspi-gpio` tool.
pub const RASPI_GPIO_CMD: &str = "/usr/bin/raspi-gpio";

/// Path to the `pigs` pigpio daemon client.
pub const PIGS_CMD: &str = "/usr/bin/pigs";

/// Result of a helper execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Renders a program invocation for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Executes `program` with `args`, waiting at most `timeout`.
///
/// # Returns
///
/// * `Ok(ExecResult)` - The command ran to completion (any exit code)
/// * `Err(GpioError::Exec)` - The command could not be spawned
/// * `Err(GpioError::HelperTimeout)` - The command was killed after `timeout`
pub async fn exec(program: &str, args: &[&str], timeout: Duration) -> GpioResult<ExecResult> {
    let command = command_line(program, args);
    tracing::trace!(command = %command, "Executing GPIO helper");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(result) => result.map_err(|e| GpioError::Exec {
            command: command.clone(),
            source: e,
        })?,
        Err(_) => {
            tracing::warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "GPIO helper timed out");
            return Err(GpioError::HelperTimeout { command, timeout });
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %command, "GPIO helper succeeded");
    } else {
        tracing::debug!(
            command = %command,
            exit_code = exit_code,
            stderr = %result.stderr,
            "GPIO helper failed"
        );
    }

    Ok(result)
}

/// Executes a helper and turns a non-zero exit into an error.
///
/// # Returns
///
/// * `Ok(String)` - The stdout output on success
/// * `Err(GpioError)` - If the command fails or returns non-zero
pub async fn exec_or_throw(program: &str, args: &[&str], timeout: Duration) -> GpioResult<String> {
    let result = exec(program, args, timeout).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(GpioError::CommandFailed {
            command: command_line(program, args),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("/usr/bin/pigs", &["r", "4"]), "/usr/bin/pigs r 4");
        assert_eq!(command_line("/usr/bin/pigs", &[]), "/usr/bin/pigs");
    }

    #[test]
    fn test_exec_result_success() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "GPIO 4: level=1".to_string(),
            stderr: String::new(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "GPIO 4: level=1");
    }

    #[test]
    fn test_exec_result_failure() {
        let result = ExecResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Must be root".to_string(),
        };
        assert!(!result.success());
        assert_eq!(result.combined_output(), "Must be root");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo", &["level=1"], Duration::from_secs(5)).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "level=1");
    }

    #[tokio::test]
    async fn test_exec_missing_binary() {
        let result = exec("/nonexistent/raspi-gpio", &["get", "4"], Duration::from_secs(5)).await;
        match result {
            Err(err @ GpioError::Exec { .. }) => assert!(err.is_permanent()),
            other => panic!("Expected Exec error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_timeout_kills_helper() {
        let result = exec("sleep", &["5"], Duration::from_millis(50)).await;
        match result {
            Err(err @ GpioError::HelperTimeout { .. }) => assert!(err.is_timeout()),
            other => panic!("Expected HelperTimeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_or_throw_failure() {
        let result = exec_or_throw("false", &[], Duration::from_secs(5)).await;
        match result {
            Err(GpioError::CommandFailed { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("Expected CommandFailed error, got {other:?}"),
        }
    }
}
