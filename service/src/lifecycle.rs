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

//! Lifecycle controller
//!
//! Starts the configured listeners around one capture log and stops them on
//! request or on a termination signal. Shutdown stops accepting first, then
//! waits for every running session to finish on its own, then drains the
//! capture log.

use crate::{
    CaptureLog, CaptureSink, CaptureSummary, CaptureWriter, DecoyConfig, DecoyError, DecoyListener,
    MetricsSnapshot, Result,
};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Final counters returned by [`LifecycleController::shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Secure shell listener metrics, if it was enabled
    pub ssh: Option<MetricsSnapshot>,
    /// Plaintext listener metrics, if it was enabled
    pub plaintext: Option<MetricsSnapshot>,
    /// Capture log counters after the final flush
    pub capture: CaptureSummary,
    /// Time since start
    pub uptime: Duration,
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uptime={:?}", self.uptime)?;
        if let Some(ssh) = &self.ssh {
            write!(f, " ssh[{ssh}]")?;
        }
        if let Some(plaintext) = &self.plaintext {
            write!(f, " plaintext[{plaintext}]")?;
        }
        write!(
            f,
            " capture[written={} failed={}]",
            self.capture.records_written, self.capture.write_failures
        )
    }
}

/// Owns the listeners and the capture log of a running service
#[derive(Debug)]
pub struct LifecycleController {
    ssh: Option<DecoyListener>,
    plaintext: Option<DecoyListener>,
    capture: CaptureLog,
    writer: CaptureWriter,
    started_at: Instant,
}

impl LifecycleController {
    /// Validate `config`, start the capture log and every enabled listener
    ///
    /// A bind failure on either listener is returned as
    /// [`DecoyError::Bind`]; nothing is left running in that case.
    pub async fn start<S: CaptureSink>(config: DecoyConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let (capture, writer) = CaptureLog::spawn(sink);

        let ssh = match config.ssh {
            Some(ssh) => match DecoyListener::bind_ssh(ssh, capture.clone()).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    writer.finish().await;
                    return Err(e);
                }
            },
            None => None,
        };
        let plaintext = match config.plaintext {
            Some(plaintext) => match DecoyListener::bind_plaintext(plaintext, capture.clone()).await
            {
                Ok(listener) => Some(listener),
                Err(e) => {
                    writer.finish().await;
                    return Err(e);
                }
            },
            None => None,
        };

        for listener in ssh.iter().chain(plaintext.iter()) {
            listener.start().await?;
        }
        info!("Decoy service started");

        Ok(Self {
            ssh,
            plaintext,
            capture,
            writer,
            started_at: Instant::now(),
        })
    }

    /// The secure shell listener, if enabled
    pub fn ssh_listener(&self) -> Option<&DecoyListener> {
        self.ssh.as_ref()
    }

    /// The plaintext listener, if enabled
    pub fn plaintext_listener(&self) -> Option<&DecoyListener> {
        self.plaintext.as_ref()
    }

    /// The shared capture log
    pub fn capture(&self) -> &CaptureLog {
        &self.capture
    }

    /// Stop accepting on every listener
    ///
    /// Sessions keep running. Calling this more than once is harmless.
    pub async fn begin_shutdown(&self) -> Result<()> {
        for listener in self.listeners() {
            match listener.shutdown().await {
                Ok(()) | Err(DecoyError::ListenerNotRunning) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop accepting, wait for every session, then flush the capture log
    pub async fn shutdown(self) -> Result<ShutdownReport> {
        self.begin_shutdown().await?;

        let active: usize = self.listeners().map(DecoyListener::session_count).sum();
        if active > 0 {
            info!(sessions = active, "Waiting for sessions to finish");
        }
        for listener in self.listeners() {
            listener.wait_sessions().await;
        }

        self.capture.close();
        let capture = self.writer.finish().await;
        if capture.write_failures > 0 {
            warn!(failures = capture.write_failures, "Capture log lost records");
        }

        let report = ShutdownReport {
            ssh: self.ssh.as_ref().map(|l| l.metrics().snapshot()),
            plaintext: self.plaintext.as_ref().map(|l| l.metrics().snapshot()),
            capture,
            uptime: self.started_at.elapsed(),
        };
        info!(%report, "Decoy service stopped");
        Ok(report)
    }

    /// Run until Ctrl-C or SIGTERM, then shut down
    pub async fn run_until_signal(self) -> Result<ShutdownReport> {
        wait_for_signal().await;
        info!("Termination requested");
        self.shutdown().await
    }

    fn listeners(&self) -> impl Iterator<Item = &DecoyListener> {
        self.ssh.iter().chain(self.plaintext.iter())
    }
}

/// Wait for Ctrl-C or, on Unix, SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
