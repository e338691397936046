use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs an external program to completion and captures its output.
pub trait CommandExecutor {
    fn execute(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> io::Result<CommandOutput> {
        SystemExecutor.execute(
            Path::new("/bin/sh"),
            &[OsString::from("-c"), OsString::from(script)],
        )
    }

    #[test]
    fn captures_stdout_on_success() {
        let out = sh("echo hello").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn captures_stderr_and_exit_code() {
        let out = sh("echo boom >&2; exit 3").unwrap();
        assert_eq!(out.code, 3);
        assert!(!out.success());
        assert_eq!(out.stderr, "boom\n");
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let err = SystemExecutor
            .execute(Path::new("/nonexistent/qemu-img"), &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
