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

//! Test clients for the decoy listeners

#![allow(dead_code)]

use bytes::Bytes;
use decoy_service::{CaptureLog, CaptureWriter, DecoyListener, MemorySink, PlaintextConfig, SshConfig};
use decoy_sshcodec::kex::{self, EphemeralKey, KexContext};
use decoy_sshcodec::{
    AuthMethod, ChannelRequest, Identification, KexInit, Message, SshCodec, SshFrame,
    UserauthRequest,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Upper bound on any single wait in these tests
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel number the test client uses for its session channel
const CLIENT_CHANNEL: u32 = 7;

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Bind and start a secure shell listener on an ephemeral port
pub async fn ssh_listener(config: SshConfig) -> (DecoyListener, MemorySink, CaptureWriter) {
    let sink = MemorySink::new();
    let (capture, writer) = CaptureLog::spawn(sink.clone());
    let listener = DecoyListener::bind_ssh(config.with_bind_address(loopback()), capture)
        .await
        .expect("bind should succeed");
    listener.start().await.expect("start should succeed");
    (listener, sink, writer)
}

/// Bind and start a plaintext listener on an ephemeral port
pub async fn plaintext_listener(
    config: PlaintextConfig,
) -> (DecoyListener, MemorySink, CaptureWriter) {
    let sink = MemorySink::new();
    let (capture, writer) = CaptureLog::spawn(sink.clone());
    let listener = DecoyListener::bind_plaintext(config.with_bind_address(loopback()), capture)
        .await
        .expect("bind should succeed");
    listener.start().await.expect("start should succeed");
    (listener, sink, writer)
}

/// Stop a listener, wait for its sessions and drain the capture log
pub async fn drain(listener: &DecoyListener, writer: CaptureWriter) {
    listener.shutdown().await.expect("shutdown should succeed");
    tokio::time::timeout(STEP_TIMEOUT, listener.wait_sessions())
        .await
        .expect("sessions should finish");
    writer.finish().await;
}

/// Log in over the plaintext listener, returning the full transcript
pub async fn plaintext_login(address: SocketAddr, username: &str, password: &str) -> String {
    let mut stream = TcpStream::connect(address).await.expect("connect");
    stream
        .write_all(format!("{username}\r\n{password}\r\n").as_bytes())
        .await
        .expect("write");
    let mut transcript = Vec::new();
    tokio::time::timeout(STEP_TIMEOUT, stream.read_to_end(&mut transcript))
        .await
        .expect("server should close")
        .expect("read");
    String::from_utf8_lossy(&transcript).into_owned()
}

/// Minimal secure shell client built on the transport codec
pub struct SshClient {
    framed: Framed<TcpStream, SshCodec>,
    client_id: Identification,
    pub server_id: Identification,
    pub host_key_blob: Vec<u8>,
    session_id: Option<[u8; 32]>,
    server_channel: Option<u32>,
}

impl SshClient {
    /// Connect and run the key exchange
    pub async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.expect("connect");
        let mut framed = Framed::new(stream, SshCodec::new());
        let client_id = Identification::new("SSH-2.0-DecoyTestClient_1.0").unwrap();
        client_id.write_line(framed.write_buffer_mut());
        let client_init = KexInit::offer().encode();
        framed
            .send(Bytes::from(client_init.clone()))
            .await
            .expect("send KEXINIT");

        let server_id = match framed.next().await {
            Some(Ok(SshFrame::Identification(id))) => id,
            other => panic!("expected identification, got {other:?}"),
        };

        let mut client = Self {
            framed,
            client_id,
            server_id,
            host_key_blob: Vec::new(),
            session_id: None,
            server_channel: None,
        };
        client.key_exchange(client_init).await;
        client
    }

    /// Address of the client end of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.framed.get_ref().local_addr().expect("local address")
    }

    /// Start a new key exchange on the established transport
    pub async fn rekey(&mut self) {
        let client_init = KexInit::offer().encode();
        self.framed
            .send(Bytes::from(client_init.clone()))
            .await
            .expect("send KEXINIT");
        self.key_exchange(client_init).await;
    }

    async fn key_exchange(&mut self, client_init: Vec<u8>) {
        let server_init = match self.framed.next().await {
            Some(Ok(SshFrame::Packet(packet))) => packet.payload,
            other => panic!("expected KEXINIT, got {other:?}"),
        };
        let negotiated = kex::negotiate(
            &KexInit::parse(&client_init).unwrap(),
            &KexInit::parse(&server_init).unwrap(),
        )
        .expect("algorithms should match");

        let ephemeral = EphemeralKey::generate();
        self.send(Message::KexEcdhInit {
            client_public: ephemeral.public_bytes().to_vec(),
        })
        .await;
        let Message::KexEcdhReply {
            host_key,
            server_public,
            signature,
        } = self.recv().await
        else {
            panic!("expected ECDH reply");
        };

        let ctx = KexContext {
            client_id: &self.client_id,
            server_id: &self.server_id,
            client_kexinit: &client_init,
            server_kexinit: &server_init,
            negotiated: &negotiated,
        };
        let session_id = self.session_id.as_ref().map(|id| id.as_slice());
        let (exchange_hash, keys) = kex::client_exchange(
            &ctx,
            ephemeral,
            &host_key,
            &server_public,
            &signature,
            session_id,
        )
        .expect("host key signature should verify");

        self.send(Message::NewKeys).await;
        self.framed
            .codec_mut()
            .install_outbound(&keys.client_to_server)
            .unwrap();
        self.framed
            .codec_mut()
            .stage_inbound(&keys.server_to_client)
            .unwrap();
        assert_eq!(self.recv().await, Message::NewKeys);
        self.session_id.get_or_insert(exchange_hash);
        self.host_key_blob = host_key;
    }

    pub async fn send(&mut self, message: Message) {
        self.framed.send(message).await.expect("send");
    }

    /// Next message, or `None` once the server closed the connection
    pub async fn try_recv(&mut self) -> Option<Message> {
        match tokio::time::timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("server should answer")
        {
            Some(Ok(SshFrame::Packet(packet))) => Some(packet.message().expect("parse")),
            Some(Ok(SshFrame::Identification(id))) => panic!("unexpected identification {id}"),
            Some(Err(_)) | None => None,
        }
    }

    pub async fn recv(&mut self) -> Message {
        self.try_recv().await.expect("connection should be open")
    }

    /// Request the userauth service
    pub async fn request_userauth(&mut self) {
        self.send(Message::ServiceRequest("ssh-userauth".into()))
            .await;
        assert_eq!(
            self.recv().await,
            Message::ServiceAccept("ssh-userauth".into())
        );
    }

    /// Try a password, returning the server's answer
    pub async fn password(&mut self, user: &str, password: &str) -> Message {
        self.send(Message::UserauthRequest(UserauthRequest {
            user: user.into(),
            service: "ssh-connection".into(),
            method: AuthMethod::Password {
                password: password.into(),
            },
        }))
        .await;
        self.recv().await
    }

    /// Open a session channel
    pub async fn open_session(&mut self) {
        self.open_session_with_window(1 << 20).await;
    }

    /// Open the session channel advertising `initial_window` bytes
    pub async fn open_session_with_window(&mut self, initial_window: u32) {
        self.send(Message::ChannelOpen {
            channel_type: "session".into(),
            sender_channel: CLIENT_CHANNEL,
            initial_window,
            max_packet: 32 * 1024,
        })
        .await;
        match self.recv().await {
            Message::ChannelOpenConfirmation {
                recipient_channel,
                sender_channel,
                ..
            } => {
                assert_eq!(recipient_channel, CLIENT_CHANNEL);
                self.server_channel = Some(sender_channel);
            }
            other => panic!("expected channel confirmation, got {other:?}"),
        }
    }

    fn channel(&self) -> u32 {
        self.server_channel.expect("session channel should be open")
    }

    /// Send a channel request and return the reply
    pub async fn channel_request(&mut self, request: ChannelRequest) -> Message {
        let recipient_channel = self.channel();
        self.send(Message::ChannelRequest {
            recipient_channel,
            want_reply: true,
            request,
        })
        .await;
        self.recv().await
    }

    /// Request a pty and a shell, returning the banner and first prompt
    pub async fn start_shell(&mut self, prompt: &str) -> String {
        let reply = self
            .channel_request(ChannelRequest::PtyReq {
                term: "xterm-256color".into(),
                columns: 80,
                rows: 24,
            })
            .await;
        assert!(matches!(reply, Message::ChannelSuccess { .. }));
        let reply = self.channel_request(ChannelRequest::Shell).await;
        assert!(matches!(reply, Message::ChannelSuccess { .. }));
        self.read_until(prompt).await
    }

    /// Send raw keystrokes
    pub async fn type_bytes(&mut self, bytes: &[u8]) {
        let recipient_channel = self.channel();
        self.send(Message::ChannelData {
            recipient_channel,
            data: Bytes::copy_from_slice(bytes),
        })
        .await;
    }

    /// Type a line followed by Enter
    pub async fn type_line(&mut self, line: &str) {
        self.type_bytes(format!("{line}\r").as_bytes()).await;
    }

    /// Collect channel data until `needle` appears
    pub async fn read_until(&mut self, needle: &str) -> String {
        let mut output = String::new();
        while !output.contains(needle) {
            match self.recv().await {
                Message::ChannelData { data, .. } => {
                    output.push_str(&String::from_utf8_lossy(&data));
                }
                Message::ChannelWindowAdjust { .. } => {}
                other => panic!("expected channel data, got {other:?} after {output:?}"),
            }
        }
        output
    }

    /// Collect everything until the server closes the channel or the
    /// connection; returns the output and the exit status, if any
    pub async fn read_to_close(&mut self) -> (String, Option<u32>) {
        let mut output = String::new();
        let mut status = None;
        while let Some(message) = self.try_recv().await {
            match message {
                Message::ChannelData { data, .. } => {
                    output.push_str(&String::from_utf8_lossy(&data));
                }
                Message::ChannelRequest {
                    request: ChannelRequest::ExitStatus(code),
                    ..
                } => status = Some(code),
                Message::ChannelClose { .. } => break,
                _ => {}
            }
        }
        (output, status)
    }

    /// Wait for the server to drop the connection
    pub async fn wait_closed(&mut self) {
        while self.try_recv().await.is_some() {}
    }
}
