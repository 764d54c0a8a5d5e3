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

//! Listener configuration types and builders
//!
//! # Examples
//!
//! ```
//! use decoy_service::{DecoyConfig, SshConfig};
//! use std::time::Duration;
//!
//! let config = DecoyConfig::default()
//!     .with_ssh(Some(
//!         SshConfig::default()
//!             .with_bind_address("127.0.0.1:2222".parse().unwrap())
//!             .with_shell_request_timeout(Duration::from_secs(5))
//!             .with_max_auth_attempts(Some(6)),
//!     ))
//!     .with_plaintext(None);
//! assert!(config.validate().is_ok());
//! ```

use crate::{DecoyError, Result};
use decoy_sshcodec::Identification;
use std::net::SocketAddr;
use std::time::Duration;

/// Settings shared by every listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent sessions
    ///
    /// Connections beyond the cap are closed right after accept.
    pub max_sessions: usize,

    /// Timeout for a single write to the peer
    pub write_timeout: Duration,
}

impl ListenerConfig {
    /// Create a listener configuration for `bind_address`
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            max_sessions: 256,
            write_timeout: Duration::from_secs(10),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(invalid("max_sessions must be greater than 0"));
        }
        if self.write_timeout.is_zero() {
            return Err(invalid("write_timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Secure shell listener configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Common listener settings
    pub listener: ListenerConfig,

    /// Identification line sent to clients, without CR LF
    pub server_id: String,

    /// Generate a fresh host key for every connection
    ///
    /// When disabled one key is generated per listener.
    pub rotate_host_key: bool,

    /// Bound on identification and key exchange
    pub handshake_timeout: Duration,

    /// Bound on authentication and opening a session channel
    pub auth_timeout: Duration,

    /// Bound on the wait for a shell request once a channel is open
    pub shell_request_timeout: Duration,

    /// Bound on each read while the fake shell is running
    pub idle_timeout: Duration,

    /// Disconnect after this many recorded attempts (None for no limit)
    pub max_auth_attempts: Option<u32>,

    /// Channel output held back by the peer's window before the session
    /// is closed
    pub max_pending_output: usize,

    /// Text sent when a shell starts
    pub banner: String,

    /// Shell prompt
    pub prompt: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::new(SocketAddr::from(([0, 0, 0, 0], 2222))),
            server_id: "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6".to_string(),
            rotate_host_key: true,
            handshake_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(20),
            shell_request_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300), // 5 minutes
            max_auth_attempts: None,
            max_pending_output: 1024 * 1024,
            banner: "Welcome to fake server!\r\nLast login: Never\r\n".to_string(),
            prompt: "$ ".to_string(),
        }
    }
}

impl SshConfig {
    /// Set the bind address
    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.listener.bind_address = address;
        self
    }

    /// Set the concurrent session cap
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.listener.max_sessions = max;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.listener.write_timeout = timeout;
        self
    }

    /// Set the identification line
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Enable or disable per-connection host keys
    pub fn with_rotate_host_key(mut self, rotate: bool) -> Self {
        self.rotate_host_key = rotate;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the authentication timeout
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Set the shell request timeout
    pub fn with_shell_request_timeout(mut self, timeout: Duration) -> Self {
        self.shell_request_timeout = timeout;
        self
    }

    /// Set the shell idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the authentication attempt cap
    pub fn with_max_auth_attempts(mut self, max: Option<u32>) -> Self {
        self.max_auth_attempts = max;
        self
    }

    /// Set the limit on output waiting for the peer's window
    pub fn with_max_pending_output(mut self, max: usize) -> Self {
        self.max_pending_output = max;
        self
    }

    /// Set the shell banner
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Set the shell prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.listener.validate()?;
        Identification::new(self.server_id.clone())
            .map_err(|e| invalid(format!("server_id: {e}")))?;
        for (name, timeout) in [
            ("handshake_timeout", self.handshake_timeout),
            ("auth_timeout", self.auth_timeout),
            ("shell_request_timeout", self.shell_request_timeout),
            ("idle_timeout", self.idle_timeout),
        ] {
            if timeout.is_zero() {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.max_auth_attempts == Some(0) {
            return Err(invalid("max_auth_attempts must be greater than 0"));
        }
        if self.max_pending_output == 0 {
            return Err(invalid("max_pending_output must be greater than 0"));
        }
        Ok(())
    }
}

/// Plaintext login listener configuration
#[derive(Debug, Clone)]
pub struct PlaintextConfig {
    /// Common listener settings
    pub listener: ListenerConfig,

    /// Text sent before the login prompt
    pub welcome: String,

    /// Bound on each line read from the peer
    pub read_timeout: Duration,

    /// Longest accepted input line; the excess is discarded
    pub max_line_length: usize,
}

impl Default for PlaintextConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::new(SocketAddr::from(([0, 0, 0, 0], 2323))),
            welcome: "Welcome to fake telnet server!\r\n".to_string(),
            read_timeout: Duration::from_secs(60),
            max_line_length: decoy_linecodec::consts::DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl PlaintextConfig {
    /// Set the bind address
    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.listener.bind_address = address;
        self
    }

    /// Set the concurrent session cap
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.listener.max_sessions = max;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.listener.write_timeout = timeout;
        self
    }

    /// Set the welcome text
    pub fn with_welcome(mut self, welcome: impl Into<String>) -> Self {
        self.welcome = welcome.into();
        self
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the line length limit
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.listener.validate()?;
        if self.read_timeout.is_zero() {
            return Err(invalid("read_timeout must be greater than 0"));
        }
        if self.max_line_length == 0 {
            return Err(invalid("max_line_length must be greater than 0"));
        }
        Ok(())
    }
}

/// Configuration for the whole service
///
/// A `None` listener is not started.
#[derive(Debug, Clone)]
pub struct DecoyConfig {
    /// Secure shell listener
    pub ssh: Option<SshConfig>,

    /// Plaintext listener
    pub plaintext: Option<PlaintextConfig>,
}

impl Default for DecoyConfig {
    fn default() -> Self {
        Self {
            ssh: Some(SshConfig::default()),
            plaintext: Some(PlaintextConfig::default()),
        }
    }
}

impl DecoyConfig {
    /// Set or disable the secure shell listener
    pub fn with_ssh(mut self, ssh: Option<SshConfig>) -> Self {
        self.ssh = ssh;
        self
    }

    /// Set or disable the plaintext listener
    pub fn with_plaintext(mut self, plaintext: Option<PlaintextConfig>) -> Self {
        self.plaintext = plaintext;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ssh.is_none() && self.plaintext.is_none() {
            return Err(invalid("at least one listener must be enabled"));
        }
        if let Some(ssh) = &self.ssh {
            ssh.validate()?;
        }
        if let Some(plaintext) = &self.plaintext {
            plaintext.validate()?;
        }
        if let (Some(ssh), Some(plaintext)) = (&self.ssh, &self.plaintext) {
            let (a, b) = (ssh.listener.bind_address, plaintext.listener.bind_address);
            if a == b && a.port() != 0 {
                return Err(invalid(format!("both listeners bind to {a}")));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DecoyError {
    DecoyError::InvalidConfig(message.into())
}
