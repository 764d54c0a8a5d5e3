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

//! Transport acceptor
//!
//! A [`DecoyListener`] owns one listening socket and hands every accepted
//! connection to its [`SessionEmulator`] in a task of its own. Stopping the
//! listener closes the socket; sessions already running are left alone and
//! can be awaited with [`DecoyListener::wait_sessions`].

use crate::plaintext::PlaintextEmulator;
use crate::ssh::SshEmulator;
use crate::{
    CaptureLog, DecoyError, ListenerConfig, ListenerSnapshot, PlaintextConfig, Protocol, Result,
    ServerMetrics, SessionContext, SessionEmulator, SessionManager, SshConfig,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pause after a failed `accept()` so errors like EMFILE do not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One listening socket and the sessions it spawned
///
/// # Example
///
/// ```no_run
/// use decoy_service::{CaptureLog, DecoyListener, MemorySink, SshConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (capture, writer) = CaptureLog::spawn(MemorySink::new());
///     let config = SshConfig::default().with_bind_address("127.0.0.1:2222".parse()?);
///     let listener = DecoyListener::bind_ssh(config, capture).await?;
///     listener.start().await?;
///
///     tokio::signal::ctrl_c().await?;
///     listener.shutdown().await?;
///     listener.wait_sessions().await;
///     writer.finish().await;
///     Ok(())
/// }
/// ```
pub struct DecoyListener {
    /// Listener settings
    config: ListenerConfig,
    /// Protocol personality
    emulator: Arc<dyn SessionEmulator>,
    /// Capture log handle given to every session
    capture: CaptureLog,
    /// Session tracking
    manager: Arc<SessionManager>,
    /// Listener metrics
    metrics: Arc<ServerMetrics>,
    /// Bound socket until `start()` moves it into the accept loop
    listener: Mutex<Option<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Bind time
    started_at: Instant,
    /// Running flag
    running: AtomicBool,
    /// Stops the accept loop
    shutdown: CancellationToken,
    /// Accept loop task handle
    accept_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DecoyListener {
    /// Bind a listener for `emulator`
    ///
    /// The socket is bound immediately but nothing is accepted until
    /// [`start()`](Self::start).
    pub async fn bind(
        config: ListenerConfig,
        emulator: Arc<dyn SessionEmulator>,
        capture: CaptureLog,
    ) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_address)
            .await
            .map_err(|source| DecoyError::Bind {
                address: config.bind_address,
                source,
            })?;
        let bind_address = listener.local_addr()?;

        info!(
            protocol = %emulator.protocol(),
            address = %bind_address,
            "Listener bound"
        );

        let metrics = Arc::new(ServerMetrics::new());
        Ok(Self {
            config,
            emulator,
            capture,
            manager: Arc::new(SessionManager::new(metrics.clone())),
            metrics,
            listener: Mutex::new(Some(listener)),
            bind_address,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            accept_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Bind a secure shell listener
    pub async fn bind_ssh(config: SshConfig, capture: CaptureLog) -> Result<Self> {
        let listener = config.listener.clone();
        let emulator = SshEmulator::new(config)?;
        Self::bind(listener, Arc::new(emulator), capture).await
    }

    /// Bind a plaintext listener
    pub async fn bind_plaintext(config: PlaintextConfig, capture: CaptureLog) -> Result<Self> {
        let listener = config.listener.clone();
        let emulator = PlaintextEmulator::new(config)?;
        Self::bind(listener, Arc::new(emulator), capture).await
    }

    /// Start accepting connections
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(DecoyError::ListenerClosed);
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DecoyError::ListenerAlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);

        info!(
            protocol = %self.protocol(),
            address = %self.bind_address,
            "Accepting connections"
        );

        let accept = AcceptLoop {
            listener,
            emulator: self.emulator.clone(),
            capture: self.capture.clone(),
            manager: self.manager.clone(),
            metrics: self.metrics.clone(),
            max_sessions: self.config.max_sessions,
            shutdown: self.shutdown.clone(),
        };
        *self.accept_handle.lock().await = Some(tokio::spawn(accept.run()));
        Ok(())
    }

    /// Stop accepting and close the listening socket
    ///
    /// Running sessions are not interrupted; use
    /// [`wait_sessions()`](Self::wait_sessions) to wait for them.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(DecoyError::ListenerNotRunning);
        }

        info!(protocol = %self.protocol(), "Shutting down listener");
        self.shutdown.cancel();

        // The accept loop owns the socket; joining it guarantees it is closed.
        if let Some(handle) = self.accept_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Accept loop task failed");
            }
        }
        self.manager.close();
        Ok(())
    }

    /// Wait until every session has finished
    ///
    /// Returns only after [`shutdown()`](Self::shutdown).
    pub async fn wait_sessions(&self) {
        self.manager.wait().await;
    }

    /// Check if the listener is accepting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the listener's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Protocol served by this listener
    pub fn protocol(&self) -> Protocol {
        self.emulator.protocol()
    }

    /// Get the number of live sessions
    pub fn session_count(&self) -> usize {
        self.manager.session_count()
    }

    /// Get a snapshot of the listener state
    pub fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            protocol: self.protocol(),
            active_sessions: self.manager.session_count(),
            total_connections: self.metrics.total_connections(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the listener metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the session manager
    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    /// Get the listener configuration
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

impl std::fmt::Debug for DecoyListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoyListener")
            .field("protocol", &self.protocol())
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("session_count", &self.session_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for DecoyListener {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("DecoyListener dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.shutdown.cancel();
        }
    }
}

/// State moved into the accept task
struct AcceptLoop {
    listener: TcpListener,
    emulator: Arc<dyn SessionEmulator>,
    capture: CaptureLog,
    manager: Arc<SessionManager>,
    metrics: Arc<ServerMetrics>,
    max_sessions: usize,
    shutdown: CancellationToken,
}

impl AcceptLoop {
    async fn run(self) {
        let protocol = self.emulator.protocol();
        loop {
            let accepted = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                result = self.listener.accept() => result,
            };

            match accepted {
                Ok((socket, peer)) => {
                    if self.manager.session_count() >= self.max_sessions {
                        warn!(
                            %peer,
                            max_sessions = self.max_sessions,
                            "Session limit reached, closing connection"
                        );
                        self.metrics.connection_rejected();
                        drop(socket);
                        continue;
                    }

                    let connection = self.manager.register(peer, protocol);
                    info!(
                        connection_id = %connection.id,
                        %peer,
                        %protocol,
                        "Connection accepted"
                    );
                    let ctx = SessionContext::new(
                        connection.clone(),
                        self.capture.clone(),
                        self.metrics.clone(),
                    );
                    let emulator = self.emulator.clone();
                    self.manager
                        .spawn(&connection, async move { emulator.run(socket, ctx).await });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    self.metrics.accept_error();
                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }
        info!(%protocol, "Accept loop terminated");
    }
}
