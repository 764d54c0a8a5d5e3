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

//! Secure shell transport driver
//!
//! Runs the handshake, then translates wire messages into
//! [`Input`]s for the [`SessionState`] machine and its [`Output`]s back into
//! wire messages. Channel flow control and line assembly live here as well;
//! the machine only sees whole lines.

use super::line::{LineEditor, LineEvent};
use super::machine::{Captured, Input, Output, Phase, Policy, SessionState};
use crate::{
    DecoyError, Protocol, Result, SessionContext, SessionEmulator, SessionOutcome, SshConfig,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use decoy_sshcodec::consts::msg;
use decoy_sshcodec::kex::{self, KexContext};
use decoy_sshcodec::{
    ChannelRequest, CodecError, HostKey, Identification, KexInit, Message, Packet, SshCodec,
    SshFrame,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::codec::{Encoder, Framed};
use tracing::{debug, info, trace};

/// Our channel number for the one session channel
const LOCAL_CHANNEL_ID: u32 = 0;

/// Receive window advertised for the session channel
const LOCAL_WINDOW: u32 = 2 * 1024 * 1024;

/// Largest channel packet accepted or sent
const LOCAL_MAX_PACKET: u32 = 32 * 1024;

/// Secure shell session emulator
///
/// One instance serves every connection of a listener. A host key is
/// generated per connection unless [`SshConfig::rotate_host_key`] is off.
#[derive(Debug)]
pub struct SshEmulator {
    config: SshConfig,
    server_id: Identification,
    policy: Policy,
    shared_host_key: Option<Arc<HostKey>>,
}

impl SshEmulator {
    /// Create an emulator from a validated configuration
    pub fn new(config: SshConfig) -> Result<Self> {
        config.validate()?;
        let server_id = Identification::new(config.server_id.clone())?;
        let shared_host_key = (!config.rotate_host_key).then(|| Arc::new(HostKey::generate()));
        let policy = Policy {
            max_auth_attempts: config.max_auth_attempts,
            banner: config.banner.clone(),
            prompt: config.prompt.clone(),
        };
        Ok(Self {
            config,
            server_id,
            policy,
            shared_host_key,
        })
    }

    /// The configuration this emulator runs with
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Fingerprint of the listener-wide host key, if keys are not rotated
    pub fn host_key_fingerprint(&self) -> Option<String> {
        self.shared_host_key.as_ref().map(|key| key.fingerprint())
    }

    /// Serve one connection over any byte stream
    pub async fn serve<S>(&self, stream: S, ctx: SessionContext) -> Result<SessionOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let host_key = self
            .shared_host_key
            .clone()
            .unwrap_or_else(|| Arc::new(HostKey::generate()));
        let mut transport = Transport::new(
            stream,
            self.server_id.clone(),
            host_key,
            self.config.listener.write_timeout,
        );

        match timeout(self.config.handshake_timeout, transport.handshake()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                info!("Handshake failed");
                debug!(error = %e, "Handshake error");
                return Ok(SessionOutcome::HandshakeFailed);
            }
            Err(_) => {
                ctx.metrics().timeout();
                info!("Handshake timed out");
                return Ok(SessionOutcome::HandshakeFailed);
            }
        }

        let mut driver = Driver {
            transport,
            state: SessionState::new(),
            policy: &self.policy,
            config: &self.config,
            ctx,
            channel: None,
            pending_open: None,
            want_reply: false,
        };
        Ok(driver.run().await)
    }
}

#[async_trait]
impl SessionEmulator for SshEmulator {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn run(&self, stream: TcpStream, ctx: SessionContext) -> Result<SessionOutcome> {
        self.serve(stream, ctx).await
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Framed transport plus the key exchange state
struct Transport<S> {
    framed: Framed<S, SshCodec>,
    server_id: Identification,
    client_id: Option<Identification>,
    host_key: Arc<HostKey>,
    session_id: Option<[u8; 32]>,
    write_timeout: Duration,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(
        stream: S,
        server_id: Identification,
        host_key: Arc<HostKey>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            framed: Framed::new(stream, SshCodec::new()),
            server_id,
            client_id: None,
            host_key,
            session_id: None,
            write_timeout,
        }
    }

    async fn send<I>(&mut self, item: I) -> Result<()>
    where
        I: Send,
        SshCodec: Encoder<I, Error = CodecError>,
    {
        match timeout(self.write_timeout, self.framed.send(item)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DecoyError::Timeout("write")),
        }
    }

    async fn recv(&mut self) -> Result<Option<Packet>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(SshFrame::Packet(packet))) => Ok(Some(packet)),
            Some(Ok(SshFrame::Identification(_))) => Err(DecoyError::Handshake(
                "unexpected identification line".to_string(),
            )),
            Some(Err(e)) => Err(e.into()),
        }
    }

    async fn recv_required(&mut self) -> Result<Packet> {
        self.recv().await?.ok_or(DecoyError::ConnectionClosed)
    }

    /// Version exchange and first key exchange
    async fn handshake(&mut self) -> Result<()> {
        // The identification line goes out in the same write as KEXINIT.
        self.server_id.write_line(self.framed.write_buffer_mut());
        let server_kexinit = KexInit::offer().encode();
        self.send(Bytes::from(server_kexinit.clone())).await?;

        match self.framed.next().await {
            Some(Ok(SshFrame::Identification(id))) => {
                debug!(client = %id, "Client identification");
                self.client_id = Some(id);
            }
            Some(Ok(SshFrame::Packet(_))) => {
                return Err(DecoyError::Handshake(
                    "packet before identification".to_string(),
                ));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(DecoyError::ConnectionClosed),
        }

        let client_kexinit = loop {
            let packet = self.recv_required().await?;
            match packet.message_number() {
                Some(msg::KEXINIT) => break packet.payload,
                Some(msg::IGNORE | msg::DEBUG) => {}
                other => {
                    return Err(DecoyError::Handshake(format!(
                        "expected KEXINIT, got message {other:?}"
                    )));
                }
            }
        };

        self.key_exchange(&server_kexinit, &client_kexinit).await
    }

    /// Run `curve25519-sha256` after both KEXINITs have been exchanged
    async fn key_exchange(&mut self, server_kexinit: &[u8], client_kexinit: &[u8]) -> Result<()> {
        let client = KexInit::parse(client_kexinit)?;
        let server = KexInit::parse(server_kexinit)?;
        let negotiated = kex::negotiate(&client, &server)?;
        let mut discard_guess =
            client.first_kex_packet_follows && kex::guess_was_wrong(&client, &server);

        let client_public = loop {
            let packet = self.recv_required().await?;
            if std::mem::take(&mut discard_guess) {
                trace!("Discarding wrongly guessed key exchange packet");
                continue;
            }
            match packet.message()? {
                Message::KexEcdhInit { client_public } => break client_public,
                Message::Ignore | Message::Debug { .. } => {}
                other => {
                    return Err(DecoyError::Handshake(format!(
                        "expected KEX_ECDH_INIT, got message {}",
                        other.number()
                    )));
                }
            }
        };

        let client_id = self
            .client_id
            .as_ref()
            .ok_or_else(|| DecoyError::Handshake("no client identification".to_string()))?;
        let ctx = KexContext {
            client_id,
            server_id: &self.server_id,
            client_kexinit,
            server_kexinit,
            negotiated: &negotiated,
        };
        let session_id = self.session_id.as_ref().map(|id| id.as_slice());
        let result = kex::server_exchange(&ctx, &self.host_key, &client_public, session_id)?;
        let exchange_hash = result.exchange_hash;

        self.send(Message::KexEcdhReply {
            host_key: result.host_key_blob,
            server_public: result.server_public,
            signature: result.signature,
        })
        .await?;
        self.send(Message::NewKeys).await?;
        let codec = self.framed.codec_mut();
        codec.install_outbound(&result.keys.server_to_client)?;
        codec.stage_inbound(&result.keys.client_to_server)?;

        loop {
            let packet = self.recv_required().await?;
            match packet.message_number() {
                Some(msg::NEWKEYS) => break,
                Some(msg::IGNORE | msg::DEBUG) => {}
                other => {
                    return Err(DecoyError::Handshake(format!(
                        "expected NEWKEYS, got message {other:?}"
                    )));
                }
            }
        }

        self.session_id.get_or_insert(exchange_hash);
        debug!(
            kex = %negotiated.kex,
            cipher = negotiated.cipher_server_to_client.name(),
            mac = negotiated.mac_server_to_client.name(),
            "Key exchange complete"
        );
        Ok(())
    }

    /// Answer a client-initiated re-key
    async fn rekey(&mut self, client_kexinit: &[u8]) -> Result<()> {
        let server_kexinit = KexInit::offer().encode();
        self.send(Bytes::from(server_kexinit.clone())).await?;
        self.key_exchange(&server_kexinit, client_kexinit).await
    }
}

// ============================================================================
// Session Driver
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PendingOpen {
    sender_channel: u32,
    initial_window: u32,
    max_packet: u32,
}

/// The confirmed session channel
#[derive(Debug)]
struct ShellChannel {
    peer_id: u32,
    peer_window: u32,
    peer_max_packet: u32,
    local_window: u32,
    outbound: BytesMut,
    max_pending: usize,
    overflowed: bool,
    editor: LineEditor,
    closed: bool,
}

impl ShellChannel {
    fn new(open: PendingOpen, max_pending: usize) -> Self {
        Self {
            peer_id: open.sender_channel,
            peer_window: open.initial_window,
            peer_max_packet: open.max_packet.clamp(1, LOCAL_MAX_PACKET),
            local_window: LOCAL_WINDOW,
            outbound: BytesMut::new(),
            max_pending,
            overflowed: false,
            editor: LineEditor::new(false),
            closed: false,
        }
    }

    /// Buffer output until the peer's window allows it
    ///
    /// Past `max_pending` the backlog is discarded and the channel is
    /// marked overflowed.
    fn queue(&mut self, bytes: &[u8]) {
        if self.closed || self.overflowed {
            return;
        }
        if self.outbound.len() + bytes.len() > self.max_pending {
            self.overflowed = true;
            self.outbound.clear();
        } else {
            self.outbound.extend_from_slice(bytes);
        }
    }

    /// Account for received data, returning the window adjustment to send
    fn consume_window(&mut self, len: usize) -> Option<u32> {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.local_window = self.local_window.saturating_sub(len);
        if self.local_window < LOCAL_WINDOW / 2 {
            let add = LOCAL_WINDOW - self.local_window;
            self.local_window = LOCAL_WINDOW;
            Some(add)
        } else {
            None
        }
    }
}

struct Driver<'a, S> {
    transport: Transport<S>,
    state: SessionState,
    policy: &'a Policy,
    config: &'a SshConfig,
    ctx: SessionContext,
    channel: Option<ShellChannel>,
    pending_open: Option<PendingOpen>,
    want_reply: bool,
}

impl<S> Driver<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self) -> SessionOutcome {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            if matches!(e, DecoyError::Timeout(_)) {
                self.ctx.metrics().timeout();
            }
            debug!(error = %e, "Transport error");
            self.state = std::mem::take(&mut self.state)
                .step(Input::Disconnected, self.policy)
                .state;
        }

        let outcome = match self.state.phase {
            Phase::HandshakeFailed => SessionOutcome::HandshakeFailed,
            Phase::NoShellRequested => {
                if self.channel.is_some() {
                    info!("No shell requested");
                } else {
                    info!("No channel opened");
                }
                SessionOutcome::NoShellRequested
            }
            _ => SessionOutcome::Closed,
        };

        if result.is_ok() && outcome == SessionOutcome::Closed {
            if self.channel.as_ref().is_some_and(|c| !c.closed) {
                let _ = self.close_channel().await;
            }
            let close = SinkExt::<Message>::close(&mut self.transport.framed);
            let _ = timeout(self.transport.write_timeout, close).await;
        }
        outcome
    }

    fn phase_deadline(&self) -> Instant {
        let bound = match self.state.phase {
            Phase::AwaitingChannel => self.config.shell_request_timeout,
            Phase::ShellEmulation => self.config.idle_timeout,
            _ => self.config.auth_timeout,
        };
        Instant::now() + bound
    }

    async fn run_loop(&mut self) -> Result<()> {
        self.apply(Input::HandshakeComplete).await?;
        let mut phase = self.state.phase;
        let mut deadline = self.phase_deadline();

        while !self.state.is_terminal() {
            match timeout_at(deadline, self.transport.recv()).await {
                Err(_) => {
                    self.ctx.metrics().timeout();
                    debug!(phase = ?self.state.phase, "Phase timed out");
                    self.apply(Input::Timeout).await?;
                }
                Ok(Ok(Some(packet))) => {
                    self.handle_packet(packet).await?;
                    if self.channel.as_ref().is_some_and(|c| c.overflowed)
                        && !self.state.is_terminal()
                    {
                        info!("Peer stopped reading channel output");
                        self.apply(Input::Disconnected).await?;
                    }
                }
                Ok(Ok(None)) => self.apply(Input::Disconnected).await?,
                Ok(Err(e)) => return Err(e),
            }

            if self.state.phase != phase || self.state.phase == Phase::ShellEmulation {
                phase = self.state.phase;
                deadline = self.phase_deadline();
            }
        }
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        let message = packet.message()?;
        trace!(number = message.number(), sequence = packet.sequence, "Message");
        match message {
            Message::Disconnect { reason, description } => {
                debug!(reason, description = %description.escape_debug(), "Peer disconnected");
                self.apply(Input::Disconnected).await
            }
            Message::Ignore | Message::Debug { .. } | Message::Unimplemented { .. } => Ok(()),
            Message::KexInit(_) => {
                // The phase deadline does not cover the exchange itself.
                let rekey = self.transport.rekey(&packet.payload);
                match timeout(self.config.handshake_timeout, rekey).await {
                    Ok(result) => result,
                    Err(_) => Err(DecoyError::Timeout("rekey")),
                }
            }
            Message::ServiceRequest(name) => self.apply(Input::ServiceRequest(name)).await,
            Message::UserauthRequest(request) => self.apply(Input::Auth(request)).await,
            Message::GlobalRequest { name, want_reply } => {
                trace!(%name, "Global request refused");
                if want_reply {
                    self.transport.send(Message::RequestFailure).await?;
                }
                Ok(())
            }
            Message::ChannelOpen {
                channel_type,
                sender_channel,
                initial_window,
                max_packet,
            } => {
                self.pending_open = Some(PendingOpen {
                    sender_channel,
                    initial_window,
                    max_packet,
                });
                let result = self.apply(Input::ChannelOpen { channel_type }).await;
                self.pending_open = None;
                result
            }
            Message::ChannelRequest {
                recipient_channel,
                want_reply,
                request,
            } => {
                if !self.is_our_channel(recipient_channel) {
                    return Ok(());
                }
                self.want_reply = want_reply;
                self.apply(Input::ChannelRequest(request)).await?;
                if self.state.pty_requested {
                    if let Some(channel) = self.channel.as_mut() {
                        channel.editor.set_echo(true);
                    }
                }
                Ok(())
            }
            Message::ChannelData {
                recipient_channel,
                data,
            } => {
                if !self.is_our_channel(recipient_channel) {
                    return Ok(());
                }
                self.replenish_window(data.len()).await?;
                self.handle_keystrokes(&data).await
            }
            Message::ChannelExtendedData {
                recipient_channel,
                data,
                ..
            } => {
                if self.is_our_channel(recipient_channel) {
                    self.replenish_window(data.len()).await?;
                }
                Ok(())
            }
            Message::ChannelWindowAdjust {
                recipient_channel,
                bytes_to_add,
            } => {
                if let Some(channel) = self.channel.as_mut() {
                    if recipient_channel == LOCAL_CHANNEL_ID {
                        channel.peer_window = channel.peer_window.saturating_add(bytes_to_add);
                    }
                }
                self.flush_channel().await
            }
            Message::ChannelEof { recipient_channel }
            | Message::ChannelClose { recipient_channel } => {
                if self.is_our_channel(recipient_channel) {
                    self.apply(Input::EndOfInput).await
                } else {
                    Ok(())
                }
            }
            Message::Unknown { number } => {
                trace!(number, "Unimplemented message");
                self.transport
                    .send(Message::Unimplemented {
                        sequence: packet.sequence,
                    })
                    .await
            }
            other => {
                trace!(number = other.number(), "Ignoring unexpected message");
                Ok(())
            }
        }
    }

    fn is_our_channel(&self, recipient_channel: u32) -> bool {
        recipient_channel == LOCAL_CHANNEL_ID && self.channel.is_some()
    }

    async fn replenish_window(&mut self, len: usize) -> Result<()> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        if let Some(bytes_to_add) = channel.consume_window(len) {
            let recipient_channel = channel.peer_id;
            self.transport
                .send(Message::ChannelWindowAdjust {
                    recipient_channel,
                    bytes_to_add,
                })
                .await?;
        }
        Ok(())
    }

    async fn handle_keystrokes(&mut self, data: &[u8]) -> Result<()> {
        if self.state.phase != Phase::ShellEmulation {
            return Ok(());
        }
        let events = match self.channel.as_mut() {
            Some(channel) => channel.editor.feed(data),
            None => return Ok(()),
        };
        for event in events {
            if self.state.is_terminal() {
                break;
            }
            match event {
                LineEvent::Echo(bytes) => self.queue_data(&bytes),
                LineEvent::Line(line) => {
                    self.flush_channel().await?;
                    self.apply(Input::Line(line)).await?;
                }
                LineEvent::Interrupt => self.apply(Input::Interrupt).await?,
                LineEvent::EndOfInput => self.apply(Input::EndOfInput).await?,
            }
        }
        self.flush_channel().await
    }

    /// Advance the machine, record its event, then send its outputs
    async fn apply(&mut self, input: Input) -> Result<()> {
        let transition = std::mem::take(&mut self.state).step(input, self.policy);
        self.state = transition.state;
        match transition.event {
            Some(Captured::Auth { username, password }) => {
                self.ctx.record_auth(username, password);
            }
            Some(Captured::Command { text, sequence }) => {
                self.ctx.record_command(text, sequence);
            }
            None => {}
        }
        for output in transition.outputs {
            self.emit(output).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, output: Output) -> Result<()> {
        match output {
            Output::ServiceAccept(name) => self.transport.send(Message::ServiceAccept(name)).await,
            Output::AuthFailure => {
                self.transport
                    .send(Message::UserauthFailure {
                        methods: vec!["password".to_string()],
                        partial_success: false,
                    })
                    .await
            }
            Output::Disconnect {
                reason,
                description,
            } => {
                self.transport
                    .send(Message::Disconnect {
                        reason,
                        description,
                    })
                    .await
            }
            Output::ConfirmChannel => {
                let Some(open) = self.pending_open.take() else {
                    return Ok(());
                };
                self.channel = Some(ShellChannel::new(open, self.config.max_pending_output));
                self.transport
                    .send(Message::ChannelOpenConfirmation {
                        recipient_channel: open.sender_channel,
                        sender_channel: LOCAL_CHANNEL_ID,
                        initial_window: LOCAL_WINDOW,
                        max_packet: LOCAL_MAX_PACKET,
                    })
                    .await
            }
            Output::RejectChannel { reason } => {
                let Some(open) = self.pending_open else {
                    return Ok(());
                };
                self.transport
                    .send(Message::ChannelOpenFailure {
                        recipient_channel: open.sender_channel,
                        reason,
                        description: "open failed".to_string(),
                    })
                    .await
            }
            Output::RequestReply(success) => {
                if !std::mem::take(&mut self.want_reply) {
                    return Ok(());
                }
                let Some(recipient_channel) = self.channel.as_ref().map(|c| c.peer_id) else {
                    return Ok(());
                };
                let reply = if success {
                    Message::ChannelSuccess { recipient_channel }
                } else {
                    Message::ChannelFailure { recipient_channel }
                };
                self.transport.send(reply).await
            }
            Output::Data(text) => {
                self.queue_data(text.as_bytes());
                self.flush_channel().await
            }
            Output::ExitStatus(status) => {
                self.flush_channel().await?;
                let Some(channel) = self.channel.as_mut() else {
                    return Ok(());
                };
                if !channel.outbound.is_empty() {
                    trace!(
                        pending = channel.outbound.len(),
                        "Dropping output beyond the peer window"
                    );
                    channel.outbound.clear();
                }
                let recipient_channel = channel.peer_id;
                self.transport
                    .send(Message::ChannelRequest {
                        recipient_channel,
                        want_reply: false,
                        request: ChannelRequest::ExitStatus(status),
                    })
                    .await
            }
            Output::CloseChannel => self.close_channel().await,
        }
    }

    fn queue_data(&mut self, bytes: &[u8]) {
        if let Some(channel) = self.channel.as_mut() {
            channel.queue(bytes);
        }
    }

    /// Send queued output within the peer's window and packet size
    async fn flush_channel(&mut self) -> Result<()> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        while !channel.closed && !channel.outbound.is_empty() && channel.peer_window > 0 {
            let len = channel
                .outbound
                .len()
                .min(channel.peer_window as usize)
                .min(channel.peer_max_packet as usize);
            let data = channel.outbound.split_to(len).freeze();
            channel.peer_window -= len as u32;
            self.transport
                .send(Message::ChannelData {
                    recipient_channel: channel.peer_id,
                    data,
                })
                .await?;
        }
        Ok(())
    }

    async fn close_channel(&mut self) -> Result<()> {
        self.flush_channel().await?;
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        if channel.closed {
            return Ok(());
        }
        channel.closed = true;
        channel.outbound.clear();
        let recipient_channel = channel.peer_id;
        self.transport
            .send(Message::ChannelEof { recipient_channel })
            .await?;
        self.transport
            .send(Message::ChannelClose { recipient_channel })
            .await
    }
}
