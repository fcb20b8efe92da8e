// ABOUTME: External tool invocation with enforced wall-clock timeouts.
// ABOUTME: Every docker, kubectl, rsync, ssh, git and curl call goes through CommandRunner.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// A fully assembled external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// A non-zero exit is tolerated (e.g. removing a container that may not exist).
    pub allow_failure: bool,
    /// Written to the child's stdin; never shown in logs or errors.
    pub stdin: Option<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            allow_failure: false,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Quote a word for a POSIX shell when it needs it.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Output from an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` was terminated by a signal")]
    Signaled { command: String },
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit is returned as `Ok` with the exit code set; only
    /// spawn failures and timeouts are errors.
    async fn output(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError>;

    /// Run the command and fail on a non-zero exit unless `allow_failure` is set.
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError> {
        let output = self.output(command).await?;
        if output.exit_code.is_none() {
            return Err(ProcessError::Signaled {
                command: command.to_string(),
            });
        }
        if output.success() || command.allow_failure {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                command: command.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn output(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError> {
        tracing::debug!(command = %command, timeout = ?command.timeout, "running external command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout kills the child.
            .kill_on_drop(true);
        // A terminal Ctrl-C reaches only stevedore; in-flight tools run to completion.
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(ref dir) = command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let input = child.stdin.take().zip(command.stdin.as_deref());

        let completion = async move {
            if let Some((mut pipe, input)) = input {
                pipe.write_all(input.as_bytes()).await?;
                drop(pipe);
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(command.timeout, completion)
            .await
            .map_err(|_| ProcessError::Timeout {
                command: command.to_string(),
                timeout: command.timeout,
            })?
            .map_err(|source| ProcessError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(command = %command, code = ?result.exit_code, "external command exited non-zero");
        }

        Ok(result)
    }
}
