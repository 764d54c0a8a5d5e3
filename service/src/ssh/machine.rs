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

//! Secure shell session state machine
//!
//! [`SessionState::step`] is a pure function: given the current state, one
//! [`Input`] and the [`Policy`], it returns the next state, the protocol
//! [`Output`]s to send and at most one [`Captured`] event. The transport
//! driver in [`session`](super::session) turns wire messages into inputs and
//! outputs back into wire messages.
//!
//! ```text
//! Connected ──handshake──> AwaitingAuth ──channel open──> AwaitingChannel ──shell──> ShellEmulation
//!     │                        │                              │                          │
//!     v                        v                              v                          v
//! HandshakeFailed       NoShellRequested              NoShellRequested                Closed
//! ```

use decoy_sshcodec::consts::{disconnect, open_failure};
use decoy_sshcodec::{AuthMethod, ChannelRequest, UserauthRequest};

/// Service clients must request before authenticating
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// The only channel type that is confirmed
pub const SESSION_CHANNEL: &str = "session";

/// Exit status reported for every command
pub const COMMAND_NOT_FOUND_STATUS: u32 = 127;

/// Position in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Transport handshake in progress
    #[default]
    Connected,
    /// Authentication attempts are being rejected; no channel yet
    AwaitingAuth,
    /// A session channel is open; waiting for a shell request
    AwaitingChannel,
    /// The fake shell is running
    ShellEmulation,
    /// The handshake failed (terminal)
    HandshakeFailed,
    /// No channel or shell was requested in time (terminal)
    NoShellRequested,
    /// The session ended (terminal)
    Closed,
}

impl Phase {
    /// Whether no further input is processed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::HandshakeFailed | Phase::NoShellRequested | Phase::Closed
        )
    }
}

/// Per-connection state owned by the session worker
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    /// Current phase
    pub phase: Phase,
    /// Whether the peer asked for a shell
    pub shell_requested: bool,
    /// Whether the peer asked for a pseudo-terminal
    pub pty_requested: bool,
    /// Recorded authentication attempts
    pub auth_attempts: u32,
    /// Recorded commands
    pub commands: u64,
}

/// Behaviour knobs for [`SessionState::step`]
#[derive(Debug, Clone)]
pub struct Policy {
    /// Disconnect after this many recorded attempts
    pub max_auth_attempts: Option<u32>,
    /// Text sent when the shell starts
    pub banner: String,
    /// Shell prompt
    pub prompt: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_auth_attempts: None,
            banner: "Welcome to fake server!\r\nLast login: Never\r\n".to_string(),
            prompt: "$ ".to_string(),
        }
    }
}

/// Something the peer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Keys are in place
    HandshakeComplete,
    /// Identification or key exchange failed
    HandshakeFailed,
    /// `SSH_MSG_SERVICE_REQUEST`
    ServiceRequest(String),
    /// `SSH_MSG_USERAUTH_REQUEST`
    Auth(UserauthRequest),
    /// `SSH_MSG_CHANNEL_OPEN`
    ChannelOpen {
        /// Requested channel type
        channel_type: String,
    },
    /// `SSH_MSG_CHANNEL_REQUEST` on the open channel
    ChannelRequest(ChannelRequest),
    /// A complete line typed at the shell
    Line(String),
    /// Ctrl-C at the shell
    Interrupt,
    /// Ctrl-D on an empty line, channel EOF or channel close
    EndOfInput,
    /// The current phase timed out
    Timeout,
    /// Transport closed or failed
    Disconnected,
}

/// Something to send to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// `SSH_MSG_SERVICE_ACCEPT`
    ServiceAccept(String),
    /// `SSH_MSG_USERAUTH_FAILURE` advertising `password`
    AuthFailure,
    /// `SSH_MSG_DISCONNECT`
    Disconnect {
        /// Reason code
        reason: u32,
        /// Description
        description: String,
    },
    /// Confirm the channel being opened
    ConfirmChannel,
    /// Refuse the channel being opened
    RejectChannel {
        /// Reason code
        reason: u32,
    },
    /// Reply to the channel request being processed
    RequestReply(bool),
    /// Text on the session channel
    Data(String),
    /// `exit-status` on the session channel
    ExitStatus(u32),
    /// Close the session channel
    CloseChannel,
}

/// Event for the capture log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Submitted credentials
    Auth {
        /// User name
        username: String,
        /// Password
        password: String,
    },
    /// Submitted command
    Command {
        /// Command text
        text: String,
        /// Position within the session, starting at 1
        sequence: u64,
    },
}

/// Result of one [`SessionState::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Next state
    pub state: SessionState,
    /// Messages to send, in order
    pub outputs: Vec<Output>,
    /// Event to record, if any
    pub event: Option<Captured>,
}

impl Transition {
    fn to(state: SessionState) -> Self {
        Self {
            state,
            outputs: Vec::new(),
            event: None,
        }
    }

    fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    fn event(mut self, event: Captured) -> Self {
        self.event = Some(event);
        self
    }

    fn phase(mut self, phase: Phase) -> Self {
        self.state.phase = phase;
        self
    }
}

impl SessionState {
    /// A fresh session waiting for its handshake
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session has ended
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Advance the state machine by one input
    pub fn step(self, input: Input, policy: &Policy) -> Transition {
        use Phase::{AwaitingAuth, AwaitingChannel, Closed, Connected, ShellEmulation};

        let phase = self.phase;
        if phase.is_terminal() {
            return Transition::to(self);
        }

        match (phase, input) {
            (Connected, Input::HandshakeComplete) => Transition::to(self).phase(AwaitingAuth),
            (Connected, _) => Transition::to(self).phase(Phase::HandshakeFailed),

            (_, Input::Disconnected) => Transition::to(self).phase(Closed),
            (AwaitingAuth | AwaitingChannel, Input::Timeout) => {
                Transition::to(self).phase(Phase::NoShellRequested)
            }
            (_, Input::Timeout) => Transition::to(self).phase(Closed),

            (_, Input::ServiceRequest(name)) => {
                if name == USERAUTH_SERVICE {
                    Transition::to(self).output(Output::ServiceAccept(name))
                } else {
                    Transition::to(self)
                        .output(Output::Disconnect {
                            reason: disconnect::SERVICE_NOT_AVAILABLE,
                            description: format!("service {name} not available"),
                        })
                        .phase(Closed)
                }
            }

            (_, Input::Auth(request)) => self.authenticate(request, policy),

            (AwaitingAuth, Input::ChannelOpen { channel_type }) => {
                if channel_type == SESSION_CHANNEL {
                    Transition::to(self)
                        .output(Output::ConfirmChannel)
                        .phase(AwaitingChannel)
                } else {
                    Transition::to(self).output(Output::RejectChannel {
                        reason: open_failure::ADMINISTRATIVELY_PROHIBITED,
                    })
                }
            }
            (_, Input::ChannelOpen { .. }) => Transition::to(self).output(Output::RejectChannel {
                reason: open_failure::ADMINISTRATIVELY_PROHIBITED,
            }),

            (AwaitingChannel | ShellEmulation, Input::ChannelRequest(request)) => {
                self.channel_request(request, policy)
            }
            (_, Input::ChannelRequest(_)) => {
                Transition::to(self).output(Output::RequestReply(false))
            }

            (ShellEmulation, Input::Line(line)) => self.shell_line(&line, policy),
            (ShellEmulation, Input::Interrupt) => {
                Transition::to(self).output(Output::Data(format!("\r\n{}", policy.prompt)))
            }
            (AwaitingChannel | ShellEmulation, Input::EndOfInput) => Transition::to(self)
                .output(Output::CloseChannel)
                .phase(Closed),

            // Keystrokes before a shell and stray handshake notices are ignored.
            (_, Input::Line(_) | Input::Interrupt | Input::EndOfInput) => Transition::to(self),
            (_, Input::HandshakeComplete | Input::HandshakeFailed) => Transition::to(self),
        }
    }

    fn authenticate(mut self, request: UserauthRequest, policy: &Policy) -> Transition {
        let password = match request.method {
            AuthMethod::Password { password } => password,
            AuthMethod::Malformed => String::new(),
            _ => return Transition::to(self).output(Output::AuthFailure),
        };
        self.auth_attempts = self.auth_attempts.saturating_add(1);
        let exhausted = policy
            .max_auth_attempts
            .is_some_and(|max| self.auth_attempts >= max);
        let transition = Transition::to(self)
            .event(Captured::Auth {
                username: request.user,
                password,
            })
            .output(Output::AuthFailure);
        if exhausted {
            transition
                .output(Output::Disconnect {
                    reason: disconnect::NO_MORE_AUTH_METHODS_AVAILABLE,
                    description: "Too many authentication failures".to_string(),
                })
                .phase(Phase::Closed)
        } else {
            transition
        }
    }

    fn channel_request(mut self, request: ChannelRequest, policy: &Policy) -> Transition {
        match request {
            ChannelRequest::PtyReq { .. } => {
                self.pty_requested = true;
                Transition::to(self).output(Output::RequestReply(true))
            }
            ChannelRequest::Env { .. } | ChannelRequest::WindowChange { .. } => {
                Transition::to(self).output(Output::RequestReply(true))
            }
            ChannelRequest::Shell if self.phase == Phase::AwaitingChannel => {
                self.shell_requested = true;
                Transition::to(self)
                    .output(Output::RequestReply(true))
                    .output(Output::Data(format!("{}{}", policy.banner, policy.prompt)))
                    .phase(Phase::ShellEmulation)
            }
            ChannelRequest::Exec { command } if self.phase == Phase::AwaitingChannel => {
                let (transition, name) = self.record_command(command);
                transition
                    .output(Output::RequestReply(true))
                    .output(Output::Data(format!("{name}: command not found\r\n")))
                    .output(Output::ExitStatus(COMMAND_NOT_FOUND_STATUS))
                    .output(Output::CloseChannel)
                    .phase(Phase::Closed)
            }
            _ => Transition::to(self).output(Output::RequestReply(false)),
        }
    }

    fn shell_line(self, line: &str, policy: &Policy) -> Transition {
        let command = line.trim();
        if command.is_empty() || command.eq_ignore_ascii_case("exit") {
            return Transition::to(self)
                .output(Output::ExitStatus(0))
                .output(Output::CloseChannel)
                .phase(Phase::Closed);
        }
        let (transition, name) = self.record_command(command.to_string());
        transition.output(Output::Data(format!(
            "{name}: command not found\r\n{}",
            policy.prompt
        )))
    }

    fn record_command(mut self, text: String) -> (Transition, String) {
        self.commands += 1;
        let sequence = self.commands;
        let name = text.clone();
        (
            Transition::to(self).event(Captured::Command { text, sequence }),
            name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ============================================================================
    // Helper Functions
    // ============================================================================

    fn password(user: &str, password: &str) -> Input {
        Input::Auth(UserauthRequest {
            user: user.into(),
            service: "ssh-connection".into(),
            method: AuthMethod::Password {
                password: password.into(),
            },
        })
    }

    fn open_session() -> Input {
        Input::ChannelOpen {
            channel_type: SESSION_CHANNEL.into(),
        }
    }

    /// Feed inputs, collecting every output and event.
    fn run(
        inputs: impl IntoIterator<Item = Input>,
        policy: &Policy,
    ) -> (SessionState, Vec<Output>, Vec<Captured>) {
        let mut state = SessionState::new();
        let mut outputs = Vec::new();
        let mut events = Vec::new();
        for input in inputs {
            let transition = state.step(input, policy);
            state = transition.state;
            outputs.extend(transition.outputs);
            events.extend(transition.event);
        }
        (state, outputs, events)
    }

    fn shell_prefix() -> Vec<Input> {
        vec![
            Input::HandshakeComplete,
            Input::ServiceRequest(USERAUTH_SERVICE.into()),
            password("root", "toor"),
            open_session(),
            Input::ChannelRequest(ChannelRequest::Shell),
        ]
    }

    // ============================================================================
    // Handshake
    // ============================================================================

    #[test]
    fn handshake_failure_is_terminal() {
        let (state, outputs, events) = run(
            [Input::HandshakeFailed, Input::HandshakeComplete],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::HandshakeFailed);
        assert!(outputs.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn disconnect_before_handshake_counts_as_handshake_failure() {
        let (state, _, _) = run([Input::Disconnected], &Policy::default());
        assert_eq!(state.phase, Phase::HandshakeFailed);
    }

    #[test]
    fn unknown_service_disconnects() {
        let (state, outputs, _) = run(
            [
                Input::HandshakeComplete,
                Input::ServiceRequest("ssh-connection".into()),
            ],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::Closed);
        assert!(matches!(
            outputs.as_slice(),
            [Output::Disconnect { reason, .. }] if *reason == disconnect::SERVICE_NOT_AVAILABLE
        ));
    }

    // ============================================================================
    // Authentication
    // ============================================================================

    #[test]
    fn password_attempts_are_recorded_and_rejected() {
        let (state, outputs, events) = run(
            [
                Input::HandshakeComplete,
                Input::ServiceRequest(USERAUTH_SERVICE.into()),
                password("root", "toor"),
                password("admin", ""),
            ],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::AwaitingAuth);
        assert_eq!(state.auth_attempts, 2);
        assert_eq!(
            outputs,
            vec![
                Output::ServiceAccept(USERAUTH_SERVICE.into()),
                Output::AuthFailure,
                Output::AuthFailure
            ]
        );
        assert_eq!(
            events,
            vec![
                Captured::Auth {
                    username: "root".into(),
                    password: "toor".into()
                },
                Captured::Auth {
                    username: "admin".into(),
                    password: String::new()
                },
            ]
        );
    }

    #[test]
    fn other_methods_are_rejected_without_recording() {
        let none = Input::Auth(UserauthRequest {
            user: "root".into(),
            service: "ssh-connection".into(),
            method: AuthMethod::None,
        });
        let publickey = Input::Auth(UserauthRequest {
            user: "root".into(),
            service: "ssh-connection".into(),
            method: AuthMethod::PublicKey {
                algorithm: "ssh-ed25519".into(),
            },
        });
        let (state, outputs, events) = run(
            [Input::HandshakeComplete, none, publickey],
            &Policy::default(),
        );
        assert_eq!(state.auth_attempts, 0);
        assert_eq!(outputs, vec![Output::AuthFailure, Output::AuthFailure]);
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_attempt_is_recorded_with_empty_fields() {
        let malformed = Input::Auth(UserauthRequest {
            user: String::new(),
            service: String::new(),
            method: AuthMethod::Malformed,
        });
        let (_, outputs, events) = run([Input::HandshakeComplete, malformed], &Policy::default());
        assert_eq!(outputs, vec![Output::AuthFailure]);
        assert_eq!(
            events,
            vec![Captured::Auth {
                username: String::new(),
                password: String::new()
            }]
        );
    }

    #[test]
    fn attempt_cap_disconnects() {
        let policy = Policy {
            max_auth_attempts: Some(2),
            ..Policy::default()
        };
        let (state, outputs, events) = run(
            [
                Input::HandshakeComplete,
                password("a", "1"),
                password("b", "2"),
                password("c", "3"),
            ],
            &policy,
        );
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            outputs.last(),
            Some(Output::Disconnect { reason, .. })
                if *reason == disconnect::NO_MORE_AUTH_METHODS_AVAILABLE
        ));
    }

    #[test]
    fn auth_timeout_means_no_shell() {
        let (state, _, events) = run(
            [Input::HandshakeComplete, password("root", "x"), Input::Timeout],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::NoShellRequested);
        assert_eq!(events.len(), 1);
    }

    // ============================================================================
    // Channels
    // ============================================================================

    #[test]
    fn only_one_session_channel_is_confirmed() {
        let (state, outputs, _) = run(
            [
                Input::HandshakeComplete,
                Input::ChannelOpen {
                    channel_type: "direct-tcpip".into(),
                },
                open_session(),
                open_session(),
            ],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::AwaitingChannel);
        assert_eq!(
            outputs,
            vec![
                Output::RejectChannel {
                    reason: open_failure::ADMINISTRATIVELY_PROHIBITED
                },
                Output::ConfirmChannel,
                Output::RejectChannel {
                    reason: open_failure::ADMINISTRATIVELY_PROHIBITED
                },
            ]
        );
    }

    #[test]
    fn shell_request_timeout_means_no_shell() {
        let (state, _, events) = run(
            [Input::HandshakeComplete, open_session(), Input::Timeout],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::NoShellRequested);
        assert!(!state.shell_requested);
        assert!(events.is_empty());
    }

    #[test]
    fn pty_env_and_subsystem_requests() {
        let (state, outputs, _) = run(
            [
                Input::HandshakeComplete,
                open_session(),
                Input::ChannelRequest(ChannelRequest::PtyReq {
                    term: "xterm".into(),
                    columns: 80,
                    rows: 24,
                }),
                Input::ChannelRequest(ChannelRequest::Env {
                    name: "LANG".into(),
                    value: "C".into(),
                }),
                Input::ChannelRequest(ChannelRequest::Subsystem {
                    name: "sftp".into(),
                }),
            ],
            &Policy::default(),
        );
        assert!(state.pty_requested);
        assert_eq!(state.phase, Phase::AwaitingChannel);
        assert_eq!(
            &outputs[1..],
            &[
                Output::RequestReply(true),
                Output::RequestReply(true),
                Output::RequestReply(false)
            ]
        );
    }

    #[test]
    fn exec_is_recorded_and_closes() {
        let (state, outputs, events) = run(
            [
                Input::HandshakeComplete,
                open_session(),
                Input::ChannelRequest(ChannelRequest::Exec {
                    command: "uname -a".into(),
                }),
            ],
            &Policy::default(),
        );
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(
            events,
            vec![Captured::Command {
                text: "uname -a".into(),
                sequence: 1
            }]
        );
        assert_eq!(
            &outputs[1..],
            &[
                Output::RequestReply(true),
                Output::Data("uname -a: command not found\r\n".into()),
                Output::ExitStatus(COMMAND_NOT_FOUND_STATUS),
                Output::CloseChannel,
            ]
        );
    }

    // ============================================================================
    // Shell Emulation
    // ============================================================================

    #[test]
    fn shell_sends_banner_and_prompt() {
        let (state, outputs, _) = run(shell_prefix(), &Policy::default());
        assert_eq!(state.phase, Phase::ShellEmulation);
        assert!(state.shell_requested);
        assert_eq!(
            outputs.last(),
            Some(&Output::Data(
                "Welcome to fake server!\r\nLast login: Never\r\n$ ".into()
            ))
        );
    }

    #[test]
    fn commands_are_answered_and_recorded() {
        let mut inputs = shell_prefix();
        inputs.push(Input::Line("ls".into()));
        inputs.push(Input::Line("  whoami  ".into()));
        inputs.push(Input::Line("EXIT".into()));
        let (state, outputs, events) = run(inputs, &Policy::default());

        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.commands, 2);
        assert!(outputs.contains(&Output::Data("ls: command not found\r\n$ ".into())));
        assert!(outputs.contains(&Output::Data("whoami: command not found\r\n$ ".into())));
        assert_eq!(outputs.last(), Some(&Output::CloseChannel));
        assert_eq!(
            &events[1..],
            &[
                Captured::Command {
                    text: "ls".into(),
                    sequence: 1
                },
                Captured::Command {
                    text: "whoami".into(),
                    sequence: 2
                },
            ]
        );
    }

    #[test]
    fn empty_line_ends_shell() {
        let mut inputs = shell_prefix();
        inputs.push(Input::Line("   ".into()));
        inputs.push(Input::Line("ls".into()));
        let (state, _, events) = run(inputs, &Policy::default());
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.commands, 0);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn interrupt_reprompts() {
        let mut inputs = shell_prefix();
        inputs.push(Input::Interrupt);
        let (state, outputs, _) = run(inputs, &Policy::default());
        assert_eq!(state.phase, Phase::ShellEmulation);
        assert_eq!(outputs.last(), Some(&Output::Data("\r\n$ ".into())));
    }

    #[test]
    fn idle_timeout_and_disconnect_close() {
        let mut inputs = shell_prefix();
        inputs.push(Input::Timeout);
        let (state, _, _) = run(inputs, &Policy::default());
        assert_eq!(state.phase, Phase::Closed);

        let mut inputs = shell_prefix();
        inputs.push(Input::Disconnected);
        let (state, _, _) = run(inputs, &Policy::default());
        assert_eq!(state.phase, Phase::Closed);
    }

    // ============================================================================
    // Properties
    // ============================================================================

    proptest! {
        #[test]
        fn every_password_attempt_is_recorded_once(
            user in ".{0,32}",
            secret in ".{0,32}",
        ) {
            let (_, outputs, events) = run(
                [Input::HandshakeComplete, password(&user, &secret)],
                &Policy::default(),
            );
            prop_assert_eq!(outputs, vec![Output::AuthFailure]);
            prop_assert_eq!(events, vec![Captured::Auth { username: user, password: secret }]);
        }

        #[test]
        fn commands_keep_submission_order(
            commands in proptest::collection::vec("[a-z][a-z0-9 ]{0,15}", 0..20),
        ) {
            let mut inputs = shell_prefix();
            inputs.extend(commands.iter().cloned().map(Input::Line));
            inputs.push(Input::Line("exit".into()));
            let (state, _, events) = run(inputs, &Policy::default());

            prop_assert_eq!(state.phase, Phase::Closed);
            let recorded: Vec<(String, u64)> = events
                .into_iter()
                .filter_map(|event| match event {
                    Captured::Command { text, sequence } => Some((text, sequence)),
                    Captured::Auth { .. } => None,
                })
                .collect();
            let expected: Vec<(String, u64)> = commands
                .iter()
                .map(|c| c.trim().to_string())
                .zip(1..)
                .collect();
            prop_assert_eq!(recorded, expected);
        }
    }
}
