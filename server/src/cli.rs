//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Command line flags

use clap::Parser;
use decoy_service::{DecoyConfig, PlaintextConfig, SshConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// SSH and plaintext login decoy
#[derive(Parser, Debug, Clone)]
#[command(name = "decoy-server", version, about)]
pub struct Args {
    /// Address for the secure shell listener
    #[arg(long, default_value = "0.0.0.0:2222")]
    pub ssh_bind: SocketAddr,

    /// Address for the plaintext listener
    #[arg(long, default_value = "0.0.0.0:2323")]
    pub plaintext_bind: SocketAddr,

    /// Do not start the secure shell listener
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_ssh: bool,

    /// Do not start the plaintext listener
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_plaintext: bool,

    /// Append capture records to this file instead of standard output
    #[arg(long, value_name = "PATH")]
    pub capture_log: Option<PathBuf>,

    /// Concurrent sessions allowed per listener
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Disconnect after this many password attempts
    #[arg(long)]
    pub max_auth_attempts: Option<u32>,

    /// Seconds to wait for a shell request once authentication started
    #[arg(long, value_name = "SECS")]
    pub shell_request_timeout: Option<u64>,

    /// Seconds of silence before an open shell is closed
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Keep one host key for the process instead of one per connection
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub static_host_key: bool,
}

impl Args {
    /// Map the flags onto the service configuration
    pub fn to_config(&self) -> DecoyConfig {
        let ssh = (!self.no_ssh).then(|| self.ssh_config());
        let plaintext = (!self.no_plaintext).then(|| self.plaintext_config());
        DecoyConfig::default().with_ssh(ssh).with_plaintext(plaintext)
    }

    fn ssh_config(&self) -> SshConfig {
        let mut config = SshConfig::default()
            .with_bind_address(self.ssh_bind)
            .with_rotate_host_key(!self.static_host_key)
            .with_max_auth_attempts(self.max_auth_attempts);
        if let Some(max) = self.max_sessions {
            config = config.with_max_sessions(max);
        }
        if let Some(secs) = self.shell_request_timeout {
            config = config.with_shell_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.idle_timeout {
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        config
    }

    fn plaintext_config(&self) -> PlaintextConfig {
        let config = PlaintextConfig::default().with_bind_address(self.plaintext_bind);
        match self.max_sessions {
            Some(max) => config.with_max_sessions(max),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("decoy-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).to_config();
        let ssh = config.ssh.unwrap();
        let plaintext = config.plaintext.unwrap();
        assert_eq!(ssh.listener.bind_address, "0.0.0.0:2222".parse().unwrap());
        assert_eq!(plaintext.listener.bind_address, "0.0.0.0:2323".parse().unwrap());
        assert!(ssh.rotate_host_key);
        assert_eq!(ssh.max_auth_attempts, None);
        assert_eq!(ssh.shell_request_timeout, SshConfig::default().shell_request_timeout);
    }

    #[test]
    fn test_flags_are_applied() {
        let args = parse(&[
            "--ssh-bind",
            "127.0.0.1:22",
            "--max-sessions",
            "8",
            "--max-auth-attempts",
            "3",
            "--shell-request-timeout",
            "5",
            "--idle-timeout",
            "60",
            "--static-host-key",
            "--capture-log",
            "/var/log/decoy.log",
        ]);
        assert_eq!(args.capture_log, Some(PathBuf::from("/var/log/decoy.log")));

        let config = args.to_config();
        let ssh = config.ssh.unwrap();
        assert_eq!(ssh.listener.bind_address, "127.0.0.1:22".parse().unwrap());
        assert_eq!(ssh.listener.max_sessions, 8);
        assert_eq!(ssh.max_auth_attempts, Some(3));
        assert_eq!(ssh.shell_request_timeout, Duration::from_secs(5));
        assert_eq!(ssh.idle_timeout, Duration::from_secs(60));
        assert!(!ssh.rotate_host_key);
        assert_eq!(config.plaintext.unwrap().listener.max_sessions, 8);
    }

    #[test]
    fn test_listeners_can_be_disabled() {
        let config = parse(&["--no-plaintext"]).to_config();
        assert!(config.ssh.is_some());
        assert!(config.plaintext.is_none());

        let config = parse(&["--no-ssh", "--no-plaintext"]).to_config();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_address_is_rejected() {
        assert!(Args::try_parse_from(["decoy-server", "--ssh-bind", "nowhere"]).is_err());
    }
}
