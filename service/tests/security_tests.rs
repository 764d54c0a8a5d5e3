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

//! Hostile and malformed client behaviour
//!
//! Every case here must end with the server still accepting, nothing
//! recorded that the peer did not actually submit, and no panic.

mod common;

use common::{STEP_TIMEOUT, SshClient, drain, plaintext_listener, plaintext_login, ssh_listener};
use decoy_service::{PlaintextConfig, SshConfig};
use decoy_sshcodec::consts::{disconnect, open_failure};
use decoy_sshcodec::{AuthMethod, ChannelRequest, KexInit, Message, UserauthRequest};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut buffer = Vec::new();
    let _ = tokio::time::timeout(STEP_TIMEOUT, stream.read_to_end(&mut buffer))
        .await
        .expect("server should close");
    buffer
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_old_protocol_version_fails_handshake() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut stream = TcpStream::connect(listener.bind_address()).await.unwrap();
    stream.write_all(b"SSH-1.5-OldClient\r\n").await.unwrap();
    let received = read_all(&mut stream).await;
    assert!(received.starts_with(b"SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6\r\n"));

    drain(&listener, writer).await;
    assert!(sink.is_empty());
    assert_eq!(listener.metrics().snapshot().handshake_failures, 1);
}

#[tokio::test]
async fn test_garbage_instead_of_handshake() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut stream = TcpStream::connect(listener.bind_address()).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: example\r\n\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    read_all(&mut stream).await;

    drain(&listener, writer).await;
    assert!(sink.is_empty());
    assert_eq!(listener.metrics().snapshot().handshake_failures, 1);
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let config = SshConfig::default().with_handshake_timeout(Duration::from_millis(200));
    let (listener, sink, writer) = ssh_listener(config).await;
    let mut stream = TcpStream::connect(listener.bind_address()).await.unwrap();
    read_all(&mut stream).await;

    drain(&listener, writer).await;
    assert!(sink.is_empty());
    let snapshot = listener.metrics().snapshot();
    assert_eq!(snapshot.handshake_failures, 1);
    assert_eq!(snapshot.timeouts, 1);
}

#[tokio::test]
async fn test_stalled_rekey_times_out() {
    let config = SshConfig::default()
        .with_handshake_timeout(Duration::from_millis(300))
        .with_idle_timeout(Duration::from_secs(60));
    let (listener, sink, writer) = ssh_listener(config).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client.open_session().await;
    client.start_shell("$ ").await;

    // Start a key exchange and never finish it
    client.send(Message::KexInit(KexInit::offer())).await;
    client.wait_closed().await;

    drain(&listener, writer).await;
    assert!(sink.is_empty());
    assert!(listener.metrics().snapshot().timeouts >= 1);
}

#[tokio::test]
async fn test_listener_survives_failed_handshakes() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    for _ in 0..5 {
        let mut stream = TcpStream::connect(listener.bind_address()).await.unwrap();
        stream.write_all(b"\x00\x01\x02\x03\r\n").await.unwrap();
        stream.shutdown().await.unwrap();
        read_all(&mut stream).await;
    }

    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client.password("root", "toor").await;
    drop(client);

    drain(&listener, writer).await;
    assert_eq!(sink.len(), 1);
    assert_eq!(listener.metrics().snapshot().handshake_failures, 5);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_attempt_cap_disconnects() {
    let config = SshConfig::default().with_max_auth_attempts(Some(2));
    let (listener, sink, writer) = ssh_listener(config).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;

    assert!(matches!(
        client.password("root", "1").await,
        Message::UserauthFailure { .. }
    ));
    assert!(matches!(
        client.password("root", "2").await,
        Message::UserauthFailure { .. }
    ));
    match client.recv().await {
        Message::Disconnect { reason, .. } => {
            assert_eq!(reason, disconnect::NO_MORE_AUTH_METHODS_AVAILABLE);
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    client.wait_closed().await;

    drain(&listener, writer).await;
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_non_password_methods_are_not_recorded() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client
        .send(Message::UserauthRequest(UserauthRequest {
            user: "root".into(),
            service: "ssh-connection".into(),
            method: AuthMethod::None,
        }))
        .await;
    assert_eq!(
        client.recv().await,
        Message::UserauthFailure {
            methods: vec!["password".into()],
            partial_success: false,
        }
    );
    drop(client);

    drain(&listener, writer).await;
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_unknown_service_is_refused() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client
        .send(Message::ServiceRequest("ssh-connection".into()))
        .await;
    match client.recv().await {
        Message::Disconnect { reason, .. } => {
            assert_eq!(reason, disconnect::SERVICE_NOT_AVAILABLE);
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    client.wait_closed().await;

    drain(&listener, writer).await;
    assert!(sink.is_empty());
}

// ============================================================================
// Connection Layer
// ============================================================================

#[tokio::test]
async fn test_forwarding_channels_are_refused() {
    let (listener, _sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client
        .send(Message::ChannelOpen {
            channel_type: "direct-tcpip".into(),
            sender_channel: 3,
            initial_window: 65_536,
            max_packet: 32_768,
        })
        .await;
    match client.recv().await {
        Message::ChannelOpenFailure {
            recipient_channel,
            reason,
            ..
        } => {
            assert_eq!(recipient_channel, 3);
            assert_eq!(reason, open_failure::ADMINISTRATIVELY_PROHIBITED);
        }
        other => panic!("expected open failure, got {other:?}"),
    }

    // The session channel is still available afterwards
    client.open_session().await;
    drop(client);
    drain(&listener, writer).await;
}

#[tokio::test]
async fn test_global_requests_are_refused() {
    let (listener, _sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client
        .send(Message::GlobalRequest {
            name: "tcpip-forward".into(),
            want_reply: true,
        })
        .await;
    assert_eq!(client.recv().await, Message::RequestFailure);
    drop(client);
    drain(&listener, writer).await;
}

#[tokio::test]
async fn test_unknown_message_is_unimplemented() {
    let (listener, _sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.send(Message::Unknown { number: 200 }).await;
    assert!(matches!(
        client.recv().await,
        Message::Unimplemented { .. }
    ));
    client.request_userauth().await;
    drop(client);
    drain(&listener, writer).await;
}

#[tokio::test]
async fn test_subsystem_is_refused() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client.open_session().await;
    let reply = client
        .channel_request(ChannelRequest::Subsystem {
            name: "sftp".into(),
        })
        .await;
    assert!(matches!(reply, Message::ChannelFailure { .. }));
    drop(client);

    drain(&listener, writer).await;
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_control_sequences_are_not_recorded() {
    let (listener, sink, writer) = ssh_listener(SshConfig::default()).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client.open_session().await;
    client.start_shell("$ ").await;

    client.type_bytes(b"rm -rf /\x03").await;
    client.read_until("^C\r\n$ ").await;
    client.type_bytes(b"\x1b[1;5Cpwd\x1bOA\x07\r").await;
    client.read_until("pwd: command not found\r\n$ ").await;
    client.type_line("exit").await;
    client.read_to_close().await;

    drain(&listener, writer).await;
    let commands: Vec<String> = sink
        .records()
        .iter()
        .filter_map(|r| r.command().map(|c| c.command.clone()))
        .collect();
    assert_eq!(commands, vec!["pwd".to_string()]);
}

// ============================================================================
// Resource Limits
// ============================================================================

#[tokio::test]
async fn test_plaintext_long_lines_are_truncated() {
    let config = PlaintextConfig::default().with_max_line_length(16);
    let (listener, sink, writer) = plaintext_listener(config).await;
    let long = "A".repeat(10_000);
    let transcript = plaintext_login(listener.bind_address(), &long, "secret").await;
    assert!(transcript.ends_with("Access denied.\r\n"));

    drain(&listener, writer).await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    let attempt = records[0].auth().unwrap();
    assert_eq!(attempt.username, "A".repeat(16));
    assert_eq!(attempt.password, "secret");
}

#[tokio::test]
async fn test_session_cap_rejects_extra_connections() {
    let config = PlaintextConfig::default().with_max_sessions(1);
    let (listener, sink, writer) = plaintext_listener(config).await;

    let mut first = TcpStream::connect(listener.bind_address()).await.unwrap();
    let mut prompt = [0u8; 64];
    let read = first.read(&mut prompt).await.unwrap();
    assert!(read > 0);

    let mut second = TcpStream::connect(listener.bind_address()).await.unwrap();
    assert!(read_all(&mut second).await.is_empty());
    assert_eq!(listener.metrics().snapshot().rejected_connections, 1);

    first.write_all(b"root\r\nroot\r\n").await.unwrap();
    read_all(&mut first).await;
    drain(&listener, writer).await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_plaintext_idle_client_is_dropped() {
    let config = PlaintextConfig::default().with_read_timeout(Duration::from_millis(200));
    let (listener, sink, writer) = plaintext_listener(config).await;
    let mut stream = TcpStream::connect(listener.bind_address()).await.unwrap();
    stream.write_all(b"root\r\n").await.unwrap();
    let transcript = read_all(&mut stream).await;
    assert!(transcript.ends_with(b"Password: "));

    drain(&listener, writer).await;
    assert!(sink.is_empty());
    assert_eq!(listener.metrics().snapshot().timeouts, 1);
}

#[tokio::test]
async fn test_unread_channel_output_closes_session() {
    let config = SshConfig::default().with_max_pending_output(2048);
    let (listener, sink, writer) = ssh_listener(config).await;
    let mut client = SshClient::connect(listener.bind_address()).await;
    client.request_userauth().await;
    client.open_session_with_window(0).await;
    let reply = client
        .channel_request(ChannelRequest::PtyReq {
            term: "xterm".into(),
            columns: 80,
            rows: 24,
        })
        .await;
    assert!(matches!(reply, Message::ChannelSuccess { .. }));
    let reply = client.channel_request(ChannelRequest::Shell).await;
    assert!(matches!(reply, Message::ChannelSuccess { .. }));

    // Echo and the error reply pile up behind a window that never opens
    client.type_line(&"a".repeat(1000)).await;
    client.wait_closed().await;

    drain(&listener, writer).await;
    let commands = sink
        .records()
        .iter()
        .filter(|r| r.command().is_some())
        .count();
    assert_eq!(commands, 1);
}
