//! External programs the toolkit delegates to: the original model runtime,
//! the graph exporter and the weight quantizer.

use std::{
    ffi::OsStr,
    io::Write,
    process::{Command, Output, Stdio},
    thread,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while running an external program.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to exchange data with `{program}`: {source}")]
    Pipe {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A program and its leading arguments.
///
/// # Examples
///
/// ```
/// use gliclass_onnx::ExternalCommand;
///
/// let cmd = ExternalCommand::parse("python export.py --opset 14").unwrap();
/// assert_eq!(cmd.program, "python");
/// assert_eq!(cmd.args, ["export.py", "--opset", "14"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// Build a command from a program and arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated command line. Returns `None` when blank.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }

    fn command<I, S>(&self, extra: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command.args(&self.args).args(extra);
        command
    }

    /// Run to completion with `extra` arguments appended.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the program cannot start and
    /// [`CommandError::Failed`] on a non-zero exit.
    pub fn run<I, S>(&self, extra: I) -> Result<(), CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        debug!(program = %self.program, "running external command");
        let output = self
            .command(extra)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        self.check(&output)
    }

    /// Run with `input` on stdin and return captured stdout.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the program cannot start, the pipe breaks,
    /// or the program exits unsuccessfully.
    pub fn exchange(&self, input: &[u8]) -> Result<Vec<u8>, CommandError> {
        debug!(program = %self.program, bytes = input.len(), "exchanging data with external command");
        let mut child = self
            .command(std::iter::empty::<&OsStr>())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let stdin = child.stdin.take();
        // Stdin is fed from its own thread so a child that answers before it
        // has read everything cannot fill the stdout pipe and stall.
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(|source| self.pipe(source))?;
        self.check(&output)?;
        written.map_err(|source| self.pipe(source))?;
        Ok(output.stdout)
    }

    fn pipe(&self, source: std::io::Error) -> CommandError {
        CommandError::Pipe {
            program: self.program.clone(),
            source,
        }
    }

    fn check(&self, output: &Output) -> Result<(), CommandError> {
        if output.status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", None)]
    #[case("   ", None)]
    #[case("tool", Some(ExternalCommand::new("tool", Vec::<String>::new())))]
    #[case("tool -x  y", Some(ExternalCommand::new("tool", ["-x", "y"])))]
    fn parse_splits_whitespace(#[case] line: &str, #[case] expected: Option<ExternalCommand>) {
        assert_eq!(ExternalCommand::parse(line), expected);
    }

    #[cfg(unix)]
    #[rstest]
    fn exchange_round_trips_stdin() {
        let cmd = ExternalCommand::new("cat", Vec::<String>::new());
        let out = cmd
            .exchange(b"ping")
            .unwrap_or_else(|e| panic!("run cat: {e}"));
        assert_eq!(out, b"ping");
    }

    #[cfg(unix)]
    #[rstest]
    fn exchange_handles_output_larger_than_a_pipe_buffer() {
        // Emits 1 MiB before touching stdin, then echoes it back.
        let cmd = ExternalCommand::new(
            "sh",
            ["-c", "head -c 1048576 /dev/zero; cat"],
        );
        let input = vec![b'x'; 256 * 1024];
        let out = cmd
            .exchange(&input)
            .unwrap_or_else(|e| panic!("run sh: {e}"));
        assert_eq!(out.len(), 1_048_576 + input.len());
        assert!(out.ends_with(&input));
    }

    #[cfg(unix)]
    #[rstest]
    fn failing_program_reports_status() {
        let cmd = ExternalCommand::new("sh", ["-c", "echo broken >&2; exit 3"]);
        let err = cmd
            .run(std::iter::empty::<&str>())
            .err()
            .unwrap_or_else(|| panic!("expected failure"));
        match err {
            CommandError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
