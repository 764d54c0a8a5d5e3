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

//! Session manager implementation
//!
//! The SessionManager is responsible for:
//! - Assigning connection IDs
//! - Spawning and tracking session workers
//! - Letting shutdown wait for in-flight sessions

use crate::{
    AuthAttempt, CaptureEvent, CaptureLog, CaptureRecord, CommandEvent, Connection, ConnectionId,
    Protocol, Result, ServerMetrics, SessionOutcome,
};
use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info_span};

/// Everything a session worker needs besides its stream
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// The connection being served
    pub connection: Connection,
    capture: CaptureLog,
    metrics: Arc<ServerMetrics>,
}

impl SessionContext {
    /// Bundle a connection with its capture log and metrics
    pub fn new(connection: Connection, capture: CaptureLog, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connection,
            capture,
            metrics,
        }
    }

    /// Connection ID shortcut
    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }

    /// Listener metrics
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Record a rejected authentication attempt
    pub fn record_auth(&self, username: impl Into<String>, password: impl Into<String>) {
        let attempt = AuthAttempt::rejected(self.connection.id, username, password);
        debug!(username = %attempt.username.escape_debug(), "Authentication attempt");
        self.metrics.auth_attempt();
        self.capture
            .record(CaptureRecord::new(&self.connection, CaptureEvent::Auth(attempt)));
    }

    /// Record a command entered at the fake shell
    pub fn record_command(&self, command: impl Into<String>, sequence: u64) {
        let event = CommandEvent {
            connection: self.connection.id,
            command: command.into(),
            sequence,
        };
        debug!(sequence, command = %event.command.escape_debug(), "Command");
        self.metrics.command();
        self.capture
            .record(CaptureRecord::new(&self.connection, CaptureEvent::Command(event)));
    }
}

/// Session manager
#[derive(Debug)]
pub struct SessionManager {
    /// Live sessions (lock-free concurrent map)
    sessions: Arc<DashMap<ConnectionId, Connection>>,
    /// Next connection ID (monotonically increasing)
    next_id: AtomicU64,
    /// Session worker tasks
    tracker: TaskTracker,
    /// Listener metrics
    metrics: Arc<ServerMetrics>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            tracker: TaskTracker::new(),
            metrics,
        }
    }

    /// Assign an ID to a freshly accepted connection and start tracking it
    pub fn register(&self, peer: SocketAddr, protocol: Protocol) -> Connection {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Connection::new(id, peer, protocol);
        self.sessions.insert(id, connection.clone());
        self.metrics.connection_opened();
        connection
    }

    /// Run a session worker for a registered connection
    ///
    /// The worker is removed from the session table when it finishes,
    /// whatever the outcome.
    pub fn spawn<F>(&self, connection: &Connection, worker: F)
    where
        F: Future<Output = Result<SessionOutcome>> + Send + 'static,
    {
        let id = connection.id;
        let span = info_span!(
            "session",
            connection_id = %id,
            peer = %connection.peer,
            protocol = %connection.protocol
        );
        let sessions = self.sessions.clone();
        let metrics = self.metrics.clone();
        self.tracker.spawn(
            async move {
                let start = Instant::now();
                match worker.await {
                    Ok(outcome) => {
                        if outcome == SessionOutcome::HandshakeFailed {
                            metrics.handshake_failure();
                        }
                        debug!(%outcome, "Session finished");
                    }
                    Err(e) => {
                        debug!(error = %e, "Session ended with error");
                    }
                }
                sessions.remove(&id);
                metrics.connection_closed(start.elapsed());
            }
            .instrument(span),
        );
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a live session
    pub fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// All live sessions
    pub fn connections(&self) -> Vec<Connection> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Stop accepting new workers into the wait set
    ///
    /// Workers already running are unaffected; [`wait()`](Self::wait)
    /// returns once they have all finished.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Wait for every session worker to finish
    ///
    /// Only returns after [`close()`](Self::close) has been called.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
