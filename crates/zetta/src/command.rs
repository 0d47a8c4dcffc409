use std::io;
use tracing::debug;

/// Output from a command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute a command and return output regardless of exit code.
///
/// All native administration calls are synchronous and block the calling
/// thread for their full duration; there is no cancellation or timeout.
pub fn exec_unchecked(program: &str, args: &[&str]) -> io::Result<CommandOutput> {
    debug!("Executing: {} {}", program, args.join(" "));

    let output = std::process::Command::new(program).args(args).output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    debug!(
        "Command exited with code {}: {} {}",
        exit_code,
        program,
        args.join(" ")
    );

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_captures_stdout() {
        let out = exec_unchecked("echo", &["hello"]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_exec_missing_program_is_io_error() {
        assert!(exec_unchecked("definitely-not-a-real-binary", &[]).is_err());
    }
}
