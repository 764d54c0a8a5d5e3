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

use super::machine::{Credentials, Input, LoginState};
use crate::{
    DecoyError, PlaintextConfig, Protocol, Result, SessionContext, SessionEmulator, SessionOutcome,
};
use async_trait::async_trait;
use decoy_linecodec::LineCodec;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;

/// Plaintext login emulator
#[derive(Debug, Clone)]
pub struct PlaintextEmulator {
    config: PlaintextConfig,
}

impl PlaintextEmulator {
    /// Create an emulator from a validated configuration
    pub fn new(config: PlaintextConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this emulator runs with
    pub fn config(&self) -> &PlaintextConfig {
        &self.config
    }

    /// Serve one connection over any byte stream
    pub async fn serve<S>(&self, stream: S, ctx: SessionContext) -> Result<SessionOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut framed = Framed::new(
            stream,
            LineCodec::with_max_line_length(self.config.max_line_length),
        );
        let write_timeout = self.config.listener.write_timeout;
        let mut state = LoginState::default();
        let mut input = Input::Start;

        loop {
            let transition = state.step(input, &self.config.welcome);
            state = transition.state;
            if let Some(Credentials { username, password }) = transition.event {
                ctx.record_auth(username, password);
            }
            if let Some(text) = transition.output {
                timeout(write_timeout, framed.send(text.as_str()))
                    .await
                    .map_err(|_| DecoyError::Timeout("write"))??;
            }
            if state.is_closed() {
                break;
            }

            input = match timeout(self.config.read_timeout, framed.next()).await {
                Ok(Some(Ok(line))) => Input::Line(line),
                Ok(Some(Err(e))) => {
                    debug!(error = %e, "Read failed");
                    Input::Disconnected
                }
                Ok(None) => Input::Disconnected,
                Err(_) => {
                    ctx.metrics().timeout();
                    debug!("Read timed out");
                    Input::Timeout
                }
            };
        }

        let _ = timeout(write_timeout, SinkExt::<&str>::close(&mut framed)).await;
        Ok(SessionOutcome::Closed)
    }
}

#[async_trait]
impl SessionEmulator for PlaintextEmulator {
    fn protocol(&self) -> Protocol {
        Protocol::Plaintext
    }

    async fn run(&self, stream: TcpStream, ctx: SessionContext) -> Result<SessionOutcome> {
        self.serve(stream, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureLog, Connection, ConnectionId, MemorySink, ServerMetrics};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tracing_test::traced_test;

    fn context(sink: &MemorySink) -> (SessionContext, crate::CaptureWriter) {
        let (capture, writer) = CaptureLog::spawn(sink.clone());
        let connection = Connection::new(
            ConnectionId::new(1),
            "192.0.2.10:5555".parse().unwrap(),
            Protocol::Plaintext,
        );
        (
            SessionContext::new(connection, capture, Arc::new(ServerMetrics::new())),
            writer,
        )
    }

    #[tokio::test]
    async fn test_login_over_duplex() {
        let sink = MemorySink::new();
        let (ctx, writer) = context(&sink);
        let emulator = PlaintextEmulator::new(PlaintextConfig::default()).unwrap();
        let (mut client, server) = tokio::io::duplex(4096);

        let session = tokio::spawn(async move { emulator.serve(server, ctx).await });
        client.write_all(b"admin\r\n1234\r\n").await.unwrap();
        let mut transcript = String::new();
        client.read_to_string(&mut transcript).await.unwrap();

        assert_eq!(session.await.unwrap().unwrap(), SessionOutcome::Closed);
        assert_eq!(
            transcript,
            "Welcome to fake telnet server!\r\nLogin: Password: Access denied.\r\n"
        );
        writer.finish().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        let attempt = records[0].auth().unwrap();
        assert_eq!(attempt.username, "admin");
        assert_eq!(attempt.password, "1234");
        assert_eq!(records[0].protocol, Protocol::Plaintext);
    }

    #[tokio::test]
    async fn test_eof_before_password_records_nothing() {
        let sink = MemorySink::new();
        let (ctx, writer) = context(&sink);
        let emulator = PlaintextEmulator::new(PlaintextConfig::default()).unwrap();
        let (mut client, server) = tokio::io::duplex(4096);

        let session = tokio::spawn(async move { emulator.serve(server, ctx).await });
        client.write_all(b"root\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut transcript = String::new();
        client.read_to_string(&mut transcript).await.unwrap();

        assert_eq!(session.await.unwrap().unwrap(), SessionOutcome::Closed);
        assert!(transcript.ends_with("Password: "));
        writer.finish().await;
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_read_timeout_closes() {
        let sink = MemorySink::new();
        let (ctx, writer) = context(&sink);
        let probe = ctx.clone();
        let emulator = PlaintextEmulator::new(
            PlaintextConfig::default().with_read_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        let (_client, server) = tokio::io::duplex(4096);

        let outcome = emulator.serve(server, ctx).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Closed);
        assert_eq!(probe.metrics().snapshot().timeouts, 1);
        assert!(logs_contain("Read timed out"));
        writer.finish().await;
        assert!(sink.is_empty());
    }
}
