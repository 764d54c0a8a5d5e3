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

//! Plaintext login state machine
//!
//! ```text
//! Connected ──start──> AwaitingUsername ──line──> AwaitingPassword ──line──> Closed
//! ```
//!
//! Any timeout or disconnect before the password line moves straight to
//! `Closed` without an event.

/// Prompt for the user name
pub const LOGIN_PROMPT: &str = "Login: ";

/// Prompt for the password
pub const PASSWORD_PROMPT: &str = "Password: ";

/// Reply to every login
pub const ACCESS_DENIED: &str = "Access denied.\r\n";

/// Login progress
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoginState {
    /// Nothing sent yet
    #[default]
    Connected,
    /// Waiting for the user name line
    AwaitingUsername,
    /// Waiting for the password line
    AwaitingPassword {
        /// User name already received
        username: String,
    },
    /// Finished (terminal)
    Closed,
}

/// Something the peer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The connection was accepted
    Start,
    /// A complete input line
    Line(String),
    /// The read timed out
    Timeout,
    /// The peer went away or the stream failed
    Disconnected,
}

/// Submitted credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name, trimmed
    pub username: String,
    /// Password, trimmed
    pub password: String,
}

/// Result of one [`LoginState::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Next state
    pub state: LoginState,
    /// Text to send
    pub output: Option<String>,
    /// Credentials to record
    pub event: Option<Credentials>,
}

impl LoginState {
    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        matches!(self, LoginState::Closed)
    }

    /// Advance by one input; `welcome` precedes the first prompt
    pub fn step(self, input: Input, welcome: &str) -> Transition {
        let (state, output, event) = match (self, input) {
            (LoginState::Connected, Input::Start) => (
                LoginState::AwaitingUsername,
                Some(format!("{welcome}{LOGIN_PROMPT}")),
                None,
            ),
            (LoginState::AwaitingUsername, Input::Line(line)) => (
                LoginState::AwaitingPassword {
                    username: line.trim().to_string(),
                },
                Some(PASSWORD_PROMPT.to_string()),
                None,
            ),
            (LoginState::AwaitingPassword { username }, Input::Line(line)) => (
                LoginState::Closed,
                Some(ACCESS_DENIED.to_string()),
                Some(Credentials {
                    username,
                    password: line.trim().to_string(),
                }),
            ),
            // Closed is sticky; anything out of order ends the session.
            (_, _) => (LoginState::Closed, None, None),
        };
        Transition {
            state,
            output,
            event,
        }
    }
}
