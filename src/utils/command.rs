//! Command execution utilities
//!
//! Only the host probe runs external programs; the planner itself never does.

use crate::utils::error::{LayoutError, Result};
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

/// Execute a command and return the output
pub fn run_command(program: &str, args: &[&str]) -> Result<Output> {
    debug!("Running: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LayoutError::CommandNotFound(program.to_string())
            } else {
                LayoutError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        warn!(
            "Command failed: {} {}\n  stderr: {}",
            program,
            args.join(" "),
            stderr.trim()
        );
        return Err(LayoutError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr,
        });
    }

    Ok(output)
}

/// Execute a command and return stdout as string
pub fn run_command_output(program: &str, args: &[&str]) -> Result<String> {
    let output = run_command(program, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check if a command exists in PATH
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_command_not_found() {
        let err = run_command("autopart-no-such-program", &[]).unwrap_err();
        assert!(matches!(err, LayoutError::CommandNotFound(_)));
    }

    #[test]
    fn failing_program_reports_command() {
        match run_command("sh", &["-c", "echo oops >&2; exit 3"]) {
            Err(LayoutError::CommandFailed { command, stderr }) => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stderr.trim(), "oops");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn output_is_trimmed() {
        assert_eq!(run_command_output("echo", &["  hi  "]).unwrap(), "hi");
    }
}
