// ABOUTME: SSH strategy: rsync the payload directory to the server, then run a restart command.
// ABOUTME: Uses the system ssh and rsync binaries in batch mode.

use std::time::Duration;

use super::{DispatchError, DispatchRequest, StrategyKind};
use crate::config::SshConfig;
use crate::process::{ExternalCommand, shell_quote};
use crate::store::PayloadRef;

pub struct SshStrategy {
    config: SshConfig,
    timeout: Duration,
}

impl SshStrategy {
    pub fn new(config: SshConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn ssh(&self, remote_command: &str) -> ExternalCommand {
        ExternalCommand::new("ssh")
            .timeout(self.timeout)
            .args(self.config.server.ssh_options())
            .arg(self.config.server.destination())
            .arg(remote_command)
    }

    pub fn plan(&self, request: &DispatchRequest) -> Result<Vec<ExternalCommand>, DispatchError> {
        let PayloadRef::Directory { ref path } = request.payload else {
            return Err(DispatchError::PayloadMismatch {
                strategy: StrategyKind::Ssh,
                payload: request.payload.to_string(),
            });
        };
        let remote_dir = self.config.remote_dir.trim_end_matches('/');

        // A trailing slash makes rsync copy the directory's contents.
        let mut source = path.display().to_string();
        if path.is_dir() && !source.ends_with('/') {
            source.push('/');
        }
        let transport = std::iter::once("ssh".to_string())
            .chain(self.config.server.ssh_options())
            .collect::<Vec<_>>()
            .join(" ");

        let mut commands = vec![
            self.ssh(&format!("mkdir -p {}", shell_quote(remote_dir))),
            ExternalCommand::new("rsync")
                .timeout(self.timeout)
                .args(["-az", "--delete", "-e"])
                .arg(transport)
                .arg(source)
                .arg(format!("{}:{}/", self.config.server.destination(), remote_dir)),
        ];
        if let Some(ref restart) = self.config.restart_command {
            commands.push(self.ssh(restart));
        }
        Ok(commands)
    }
}
