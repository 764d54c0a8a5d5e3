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

//! Session record model shared by listeners, emulators and the capture log

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a connection (monotonically increasing per listener)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Protocol a listener impersonates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Secure shell
    Ssh,
    /// Plaintext terminal login (telnet-like)
    Plaintext,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// An accepted connection.
///
/// The session worker owns the connection for its whole life; the session
/// manager only keeps a copy for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Connection ID
    pub id: ConnectionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Impersonated protocol
    pub protocol: Protocol,
    /// When the connection was accepted
    pub accepted_at: DateTime<Utc>,
}

impl Connection {
    /// Describe a connection accepted now
    pub fn new(id: ConnectionId, peer: SocketAddr, protocol: Protocol) -> Self {
        Self {
            id,
            peer,
            protocol,
            accepted_at: Utc::now(),
        }
    }
}

/// Outcome of an authentication attempt.
///
/// There is no success variant; no attempt can ever be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The credentials were refused
    Rejected,
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Credentials submitted by a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    /// Originating connection
    pub connection: ConnectionId,
    /// Submitted user name
    pub username: String,
    /// Submitted secret
    pub password: String,
    /// Always [`AuthOutcome::Rejected`]
    pub outcome: AuthOutcome,
}

impl AuthAttempt {
    /// Record a rejected attempt
    pub fn rejected(
        connection: ConnectionId,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            username: username.into(),
            password: password.into(),
            outcome: AuthOutcome::Rejected,
        }
    }
}

/// A command line entered at the fake shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// Originating connection
    pub connection: ConnectionId,
    /// Command text as received
    pub command: String,
    /// Position within the session, starting at 1
    pub sequence: u64,
}

/// Something worth keeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Submitted credentials
    Auth(AuthAttempt),
    /// Submitted command
    Command(CommandEvent),
}

/// One capture log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    /// When the event was observed
    pub timestamp: DateTime<Utc>,
    /// Originating connection
    pub connection: ConnectionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Protocol the event arrived over
    pub protocol: Protocol,
    /// The event itself
    pub event: CaptureEvent,
}

impl CaptureRecord {
    /// Stamp `event` for `connection` with the current time
    pub fn new(connection: &Connection, event: CaptureEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            connection: connection.id,
            peer: connection.peer,
            protocol: connection.protocol,
            event,
        }
    }

    /// The credentials, if this is an auth record
    pub fn auth(&self) -> Option<&AuthAttempt> {
        match &self.event {
            CaptureEvent::Auth(attempt) => Some(attempt),
            CaptureEvent::Command(_) => None,
        }
    }

    /// The command, if this is a command record
    pub fn command(&self) -> Option<&CommandEvent> {
        match &self.event {
            CaptureEvent::Command(command) => Some(command),
            CaptureEvent::Auth(_) => None,
        }
    }
}

/// Renders the single-line capture log format. Strings are escaped so a
/// record never spans more than one line.
impl fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} peer={} proto={} ",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.connection,
            self.peer,
            self.protocol
        )?;
        match &self.event {
            CaptureEvent::Auth(attempt) => write!(
                f,
                "auth user=\"{}\" password=\"{}\" outcome={}",
                attempt.username.escape_debug(),
                attempt.password.escape_debug(),
                attempt.outcome
            ),
            CaptureEvent::Command(command) => write!(
                f,
                "command seq={} text=\"{}\"",
                command.sequence,
                command.command.escape_debug()
            ),
        }
    }
}

/// Terminal state a session worker finished in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The transport handshake never completed
    HandshakeFailed,
    /// A channel was never opened or a shell never requested in time
    NoShellRequested,
    /// The session ran and closed
    Closed,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeFailed => write!(f, "handshake-failed"),
            Self::NoShellRequested => write!(f, "no-shell-requested"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Listener snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ListenerSnapshot {
    /// Impersonated protocol
    pub protocol: Protocol,
    /// Number of live sessions
    pub active_sessions: usize,
    /// Total connections accepted since start
    pub total_connections: u64,
    /// Listener bind address
    pub bind_address: SocketAddr,
    /// Listener uptime
    pub uptime: Duration,
    /// Listener start time
    pub started_at: Instant,
}

impl fmt::Display for ListenerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecoyListener {{ proto: {}, active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.protocol,
            self.active_sessions,
            self.total_connections,
            self.bind_address,
            self.uptime
        )
    }
}
