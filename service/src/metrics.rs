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

//! Lock-free metrics for a decoy listener
//!
//! Every update is also reported through the [`metrics`] facade, so an
//! installed exporter sees the same counts under `decoy.*` names.

use metrics::{counter, gauge, histogram};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free listener metrics
///
/// All metrics are stored as atomics and can be updated from every session
/// task without locks. Use [`snapshot()`](ServerMetrics::snapshot) for a
/// point-in-time view.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Captures
    auth_attempts: AtomicU64,
    commands: AtomicU64,

    // Errors
    accept_errors: AtomicU64,
    handshake_failures: AtomicU64,
    timeouts: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            auth_attempts: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new session being started
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.connections.total").increment(1);
        gauge!("decoy.connections.active").increment(1.0);
    }

    /// Record a session ending
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        gauge!("decoy.connections.active").decrement(1.0);
        histogram!("decoy.session.duration").record(duration.as_secs_f64());
    }

    /// Record a connection closed at accept because of the session cap
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.connections.rejected").increment(1);
    }

    /// Get the current number of active sessions
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Capture tracking

    /// Record a captured authentication attempt
    pub fn auth_attempt(&self) {
        self.auth_attempts.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.auth_attempts").increment(1);
    }

    /// Record a captured command
    pub fn command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.commands").increment(1);
    }

    // Error tracking

    /// Record a failed `accept()`
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.errors.accept").increment(1);
    }

    /// Record a session that never completed its handshake
    pub fn handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.errors.handshake").increment(1);
    }

    /// Record a peer timeout
    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("decoy.timeouts").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Counters are read one at a time, so a snapshot taken while sessions
    /// are running may be off by a few counts between fields.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            auth_attempts: self.auth_attempts.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of listener metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sessions started since listener start
    pub total_connections: u64,
    /// Sessions currently running
    pub active_connections: u64,
    /// Connections closed at accept because of the session cap
    pub rejected_connections: u64,
    /// Captured authentication attempts
    pub auth_attempts: u64,
    /// Captured commands
    pub commands: u64,
    /// Failed accept calls
    pub accept_errors: u64,
    /// Sessions that ended during the handshake
    pub handshake_failures: u64,
    /// Peer timeouts
    pub timeouts: u64,
    /// Listener uptime
    pub uptime: Duration,
    /// Average session duration
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Total error count
    pub fn total_errors(&self) -> u64 {
        self.accept_errors + self.handshake_failures + self.timeouts
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections={} active={} rejected={} auth={} commands={} errors={}",
            self.total_connections,
            self.active_connections,
            self.rejected_connections,
            self.auth_attempts,
            self.commands,
            self.total_errors()
        )
    }
}
