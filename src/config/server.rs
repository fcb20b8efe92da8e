// ABOUTME: SSH destination for the ssh strategy.
// ABOUTME: Accepts "host", "user@host", "host:port", "user@host:port" or a detailed mapping.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshServer {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
}

impl SshServer {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err("user cannot be empty".to_string()),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (host, port)
            }
            None => (rest, 22),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(SshServer {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
            identity_file: None,
        })
    }

    /// `user@host` or `host`, as ssh and rsync expect it.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Options shared by every ssh invocation against this server.
    pub fn ssh_options(&self) -> Vec<String> {
        let mut opts = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(ref identity) = self.identity_file {
            opts.push("-i".to_string());
            opts.push(identity.display().to_string());
        }
        opts
    }
}

impl<'de> Deserialize<'de> for SshServer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ServerEntry::deserialize(deserializer)? {
            ServerEntry::Simple(s) => SshServer::parse(&s).map_err(serde::de::Error::custom),
            ServerEntry::Detailed {
                host,
                port,
                user,
                identity_file,
            } => Ok(SshServer {
                host,
                port,
                user,
                identity_file,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Simple(String),
    Detailed {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        identity_file: Option<PathBuf>,
    },
}

fn default_port() -> u16 {
    22
}
