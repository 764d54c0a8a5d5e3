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

//! Transport, authentication and connection layer messages
//!
//! [`Message`] covers the subset of SSH-2 needed to carry a client through
//! key exchange, password authentication and a single interactive session
//! channel. Anything else decodes to [`Message::Unknown`] so the caller can
//! answer with `SSH_MSG_UNIMPLEMENTED`.

use crate::consts::msg;
use crate::kex::KexInit;
use crate::wire::{WireReader, WireWrite};
use crate::CodecResult;
use bytes::{BufMut, Bytes, BytesMut};

/// A decoded SSH message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// SSH_MSG_DISCONNECT
    Disconnect {
        /// Reason code
        reason: u32,
        /// Human-readable description
        description: String,
    },
    /// SSH_MSG_IGNORE
    Ignore,
    /// SSH_MSG_UNIMPLEMENTED
    Unimplemented {
        /// Sequence number of the rejected packet
        sequence: u32,
    },
    /// SSH_MSG_DEBUG
    Debug {
        /// Whether the client should display the message
        always_display: bool,
        /// Message text
        message: String,
    },
    /// SSH_MSG_SERVICE_REQUEST
    ServiceRequest(String),
    /// SSH_MSG_SERVICE_ACCEPT
    ServiceAccept(String),
    /// SSH_MSG_KEXINIT
    KexInit(KexInit),
    /// SSH_MSG_NEWKEYS
    NewKeys,
    /// SSH_MSG_KEX_ECDH_INIT
    KexEcdhInit {
        /// Client ephemeral public key (Q_C)
        client_public: Vec<u8>,
    },
    /// SSH_MSG_KEX_ECDH_REPLY
    KexEcdhReply {
        /// Host key blob (K_S)
        host_key: Vec<u8>,
        /// Server ephemeral public key (Q_S)
        server_public: Vec<u8>,
        /// Signature over the exchange hash
        signature: Vec<u8>,
    },
    /// SSH_MSG_USERAUTH_REQUEST
    UserauthRequest(UserauthRequest),
    /// SSH_MSG_USERAUTH_FAILURE
    UserauthFailure {
        /// Methods that may continue
        methods: Vec<String>,
        /// Partial success flag
        partial_success: bool,
    },
    /// SSH_MSG_GLOBAL_REQUEST
    GlobalRequest {
        /// Request name
        name: String,
        /// Whether a reply is expected
        want_reply: bool,
    },
    /// SSH_MSG_REQUEST_FAILURE
    RequestFailure,
    /// SSH_MSG_CHANNEL_OPEN
    ChannelOpen {
        /// Channel type, e.g. `session`
        channel_type: String,
        /// Sender's channel number
        sender_channel: u32,
        /// Sender's initial window
        initial_window: u32,
        /// Sender's maximum packet size
        max_packet: u32,
    },
    /// SSH_MSG_CHANNEL_OPEN_CONFIRMATION
    ChannelOpenConfirmation {
        /// Peer's channel number
        recipient_channel: u32,
        /// Our channel number
        sender_channel: u32,
        /// Our initial window
        initial_window: u32,
        /// Our maximum packet size
        max_packet: u32,
    },
    /// SSH_MSG_CHANNEL_OPEN_FAILURE
    ChannelOpenFailure {
        /// Peer's channel number
        recipient_channel: u32,
        /// Failure reason code
        reason: u32,
        /// Human-readable description
        description: String,
    },
    /// SSH_MSG_CHANNEL_WINDOW_ADJUST
    ChannelWindowAdjust {
        /// Recipient channel
        recipient_channel: u32,
        /// Bytes added to the window
        bytes_to_add: u32,
    },
    /// SSH_MSG_CHANNEL_DATA
    ChannelData {
        /// Recipient channel
        recipient_channel: u32,
        /// Payload
        data: Bytes,
    },
    /// SSH_MSG_CHANNEL_EXTENDED_DATA
    ChannelExtendedData {
        /// Recipient channel
        recipient_channel: u32,
        /// Data type code, 1 for stderr
        data_type: u32,
        /// Payload
        data: Bytes,
    },
    /// SSH_MSG_CHANNEL_EOF
    ChannelEof {
        /// Recipient channel
        recipient_channel: u32,
    },
    /// SSH_MSG_CHANNEL_CLOSE
    ChannelClose {
        /// Recipient channel
        recipient_channel: u32,
    },
    /// SSH_MSG_CHANNEL_REQUEST
    ChannelRequest {
        /// Recipient channel
        recipient_channel: u32,
        /// Whether a reply is expected
        want_reply: bool,
        /// Request type and payload
        request: ChannelRequest,
    },
    /// SSH_MSG_CHANNEL_SUCCESS
    ChannelSuccess {
        /// Recipient channel
        recipient_channel: u32,
    },
    /// SSH_MSG_CHANNEL_FAILURE
    ChannelFailure {
        /// Recipient channel
        recipient_channel: u32,
    },
    /// Any message number this crate does not model.
    Unknown {
        /// Message number
        number: u8,
    },
}

/// Body of an `SSH_MSG_USERAUTH_REQUEST`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserauthRequest {
    /// User name
    pub user: String,
    /// Service name, normally `ssh-connection`
    pub service: String,
    /// Method and its fields
    pub method: AuthMethod,
}

/// Authentication method carried by a userauth request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// `none`
    None,
    /// `password`
    Password {
        /// The submitted password
        password: String,
    },
    /// `publickey`
    PublicKey {
        /// Public key algorithm name
        algorithm: String,
    },
    /// `keyboard-interactive`
    KeyboardInteractive,
    /// Any other method name
    Other(String),
    /// The request could not be fully parsed
    Malformed,
}

impl AuthMethod {
    /// Method name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password { .. } => "password",
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::KeyboardInteractive => "keyboard-interactive",
            AuthMethod::Other(name) => name,
            AuthMethod::Malformed => "malformed",
        }
    }
}

/// Channel request types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRequest {
    /// `pty-req`
    PtyReq {
        /// TERM value
        term: String,
        /// Width in characters
        columns: u32,
        /// Height in rows
        rows: u32,
    },
    /// `shell`
    Shell,
    /// `exec`
    Exec {
        /// Command line
        command: String,
    },
    /// `env`
    Env {
        /// Variable name
        name: String,
        /// Variable value
        value: String,
    },
    /// `window-change`
    WindowChange {
        /// Width in characters
        columns: u32,
        /// Height in rows
        rows: u32,
    },
    /// `subsystem`
    Subsystem {
        /// Subsystem name
        name: String,
    },
    /// `exit-status`
    ExitStatus(u32),
    /// Any other request name
    Other(String),
}

impl ChannelRequest {
    /// Request name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            ChannelRequest::PtyReq { .. } => "pty-req",
            ChannelRequest::Shell => "shell",
            ChannelRequest::Exec { .. } => "exec",
            ChannelRequest::Env { .. } => "env",
            ChannelRequest::WindowChange { .. } => "window-change",
            ChannelRequest::Subsystem { .. } => "subsystem",
            ChannelRequest::ExitStatus(_) => "exit-status",
            ChannelRequest::Other(name) => name,
        }
    }
}

impl Message {
    /// Parse a packet payload.
    pub fn parse(payload: &[u8]) -> CodecResult<Message> {
        let mut r = WireReader::new(payload);
        let number = r.read_u8("message number")?;
        let message = match number {
            msg::DISCONNECT => Message::Disconnect {
                reason: r.read_u32("reason code")?,
                description: r.read_text("description")?,
            },
            msg::IGNORE => Message::Ignore,
            msg::UNIMPLEMENTED => Message::Unimplemented {
                sequence: r.read_u32("sequence number")?,
            },
            msg::DEBUG => Message::Debug {
                always_display: r.read_bool("always_display")?,
                message: r.read_text("message")?,
            },
            msg::SERVICE_REQUEST => Message::ServiceRequest(r.read_text("service name")?),
            msg::SERVICE_ACCEPT => Message::ServiceAccept(r.read_text("service name")?),
            msg::KEXINIT => Message::KexInit(KexInit::parse(payload)?),
            msg::NEWKEYS => Message::NewKeys,
            msg::KEX_ECDH_INIT => Message::KexEcdhInit {
                client_public: r.read_string("Q_C")?.to_vec(),
            },
            msg::KEX_ECDH_REPLY => Message::KexEcdhReply {
                host_key: r.read_string("K_S")?.to_vec(),
                server_public: r.read_string("Q_S")?.to_vec(),
                signature: r.read_string("signature")?.to_vec(),
            },
            msg::USERAUTH_REQUEST => Message::UserauthRequest(parse_userauth(&mut r)),
            msg::USERAUTH_FAILURE => Message::UserauthFailure {
                methods: r.read_name_list("authentications")?,
                partial_success: r.read_bool("partial success")?,
            },
            msg::GLOBAL_REQUEST => Message::GlobalRequest {
                name: r.read_text("request name")?,
                want_reply: r.read_bool("want reply")?,
            },
            msg::REQUEST_FAILURE => Message::RequestFailure,
            msg::CHANNEL_OPEN => Message::ChannelOpen {
                channel_type: r.read_text("channel type")?,
                sender_channel: r.read_u32("sender channel")?,
                initial_window: r.read_u32("initial window size")?,
                max_packet: r.read_u32("maximum packet size")?,
            },
            msg::CHANNEL_OPEN_CONFIRMATION => Message::ChannelOpenConfirmation {
                recipient_channel: r.read_u32("recipient channel")?,
                sender_channel: r.read_u32("sender channel")?,
                initial_window: r.read_u32("initial window size")?,
                max_packet: r.read_u32("maximum packet size")?,
            },
            msg::CHANNEL_OPEN_FAILURE => Message::ChannelOpenFailure {
                recipient_channel: r.read_u32("recipient channel")?,
                reason: r.read_u32("reason code")?,
                description: r.read_text("description")?,
            },
            msg::CHANNEL_WINDOW_ADJUST => Message::ChannelWindowAdjust {
                recipient_channel: r.read_u32("recipient channel")?,
                bytes_to_add: r.read_u32("bytes to add")?,
            },
            msg::CHANNEL_DATA => Message::ChannelData {
                recipient_channel: r.read_u32("recipient channel")?,
                data: Bytes::copy_from_slice(r.read_string("data")?),
            },
            msg::CHANNEL_EXTENDED_DATA => Message::ChannelExtendedData {
                recipient_channel: r.read_u32("recipient channel")?,
                data_type: r.read_u32("data type code")?,
                data: Bytes::copy_from_slice(r.read_string("data")?),
            },
            msg::CHANNEL_EOF => Message::ChannelEof {
                recipient_channel: r.read_u32("recipient channel")?,
            },
            msg::CHANNEL_CLOSE => Message::ChannelClose {
                recipient_channel: r.read_u32("recipient channel")?,
            },
            msg::CHANNEL_REQUEST => {
                let recipient_channel = r.read_u32("recipient channel")?;
                let name = r.read_text("request type")?;
                let want_reply = r.read_bool("want reply")?;
                Message::ChannelRequest {
                    recipient_channel,
                    want_reply,
                    request: parse_channel_request(name, &mut r)?,
                }
            }
            msg::CHANNEL_SUCCESS => Message::ChannelSuccess {
                recipient_channel: r.read_u32("recipient channel")?,
            },
            msg::CHANNEL_FAILURE => Message::ChannelFailure {
                recipient_channel: r.read_u32("recipient channel")?,
            },
            number => Message::Unknown { number },
        };
        Ok(message)
    }

    /// Message number.
    pub fn number(&self) -> u8 {
        match self {
            Message::Disconnect { .. } => msg::DISCONNECT,
            Message::Ignore => msg::IGNORE,
            Message::Unimplemented { .. } => msg::UNIMPLEMENTED,
            Message::Debug { .. } => msg::DEBUG,
            Message::ServiceRequest(_) => msg::SERVICE_REQUEST,
            Message::ServiceAccept(_) => msg::SERVICE_ACCEPT,
            Message::KexInit(_) => msg::KEXINIT,
            Message::NewKeys => msg::NEWKEYS,
            Message::KexEcdhInit { .. } => msg::KEX_ECDH_INIT,
            Message::KexEcdhReply { .. } => msg::KEX_ECDH_REPLY,
            Message::UserauthRequest(_) => msg::USERAUTH_REQUEST,
            Message::UserauthFailure { .. } => msg::USERAUTH_FAILURE,
            Message::GlobalRequest { .. } => msg::GLOBAL_REQUEST,
            Message::RequestFailure => msg::REQUEST_FAILURE,
            Message::ChannelOpen { .. } => msg::CHANNEL_OPEN,
            Message::ChannelOpenConfirmation { .. } => msg::CHANNEL_OPEN_CONFIRMATION,
            Message::ChannelOpenFailure { .. } => msg::CHANNEL_OPEN_FAILURE,
            Message::ChannelWindowAdjust { .. } => msg::CHANNEL_WINDOW_ADJUST,
            Message::ChannelData { .. } => msg::CHANNEL_DATA,
            Message::ChannelExtendedData { .. } => msg::CHANNEL_EXTENDED_DATA,
            Message::ChannelEof { .. } => msg::CHANNEL_EOF,
            Message::ChannelClose { .. } => msg::CHANNEL_CLOSE,
            Message::ChannelRequest { .. } => msg::CHANNEL_REQUEST,
            Message::ChannelSuccess { .. } => msg::CHANNEL_SUCCESS,
            Message::ChannelFailure { .. } => msg::CHANNEL_FAILURE,
            Message::Unknown { number } => *number,
        }
    }

    /// Append the encoded payload to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        if let Message::KexInit(init) = self {
            buf.put_slice(&init.encode());
            return;
        }
        buf.put_u8(self.number());
        match self {
            Message::Disconnect {
                reason,
                description,
            } => {
                buf.put_u32(*reason);
                buf.put_ssh_string(description.as_bytes());
                buf.put_ssh_string(b"");
            }
            Message::Ignore | Message::NewKeys | Message::RequestFailure => {}
            Message::Unimplemented { sequence } => buf.put_u32(*sequence),
            Message::Debug {
                always_display,
                message,
            } => {
                buf.put_ssh_bool(*always_display);
                buf.put_ssh_string(message.as_bytes());
                buf.put_ssh_string(b"");
            }
            Message::ServiceRequest(name) | Message::ServiceAccept(name) => {
                buf.put_ssh_string(name.as_bytes());
            }
            Message::KexInit(_) => {}
            Message::KexEcdhInit { client_public } => buf.put_ssh_string(client_public),
            Message::KexEcdhReply {
                host_key,
                server_public,
                signature,
            } => {
                buf.put_ssh_string(host_key);
                buf.put_ssh_string(server_public);
                buf.put_ssh_string(signature);
            }
            Message::UserauthRequest(request) => {
                buf.put_ssh_string(request.user.as_bytes());
                buf.put_ssh_string(request.service.as_bytes());
                buf.put_ssh_string(request.method.name().as_bytes());
                match &request.method {
                    AuthMethod::Password { password } => {
                        buf.put_ssh_bool(false);
                        buf.put_ssh_string(password.as_bytes());
                    }
                    AuthMethod::PublicKey { algorithm } => {
                        buf.put_ssh_bool(false);
                        buf.put_ssh_string(algorithm.as_bytes());
                        buf.put_ssh_string(b"");
                    }
                    AuthMethod::KeyboardInteractive => {
                        buf.put_ssh_string(b"");
                        buf.put_ssh_string(b"");
                    }
                    AuthMethod::None | AuthMethod::Other(_) | AuthMethod::Malformed => {}
                }
            }
            Message::UserauthFailure {
                methods,
                partial_success,
            } => {
                buf.put_name_list(methods);
                buf.put_ssh_bool(*partial_success);
            }
            Message::GlobalRequest { name, want_reply } => {
                buf.put_ssh_string(name.as_bytes());
                buf.put_ssh_bool(*want_reply);
            }
            Message::ChannelOpen {
                channel_type,
                sender_channel,
                initial_window,
                max_packet,
            } => {
                buf.put_ssh_string(channel_type.as_bytes());
                buf.put_u32(*sender_channel);
                buf.put_u32(*initial_window);
                buf.put_u32(*max_packet);
            }
            Message::ChannelOpenConfirmation {
                recipient_channel,
                sender_channel,
                initial_window,
                max_packet,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_u32(*sender_channel);
                buf.put_u32(*initial_window);
                buf.put_u32(*max_packet);
            }
            Message::ChannelOpenFailure {
                recipient_channel,
                reason,
                description,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_u32(*reason);
                buf.put_ssh_string(description.as_bytes());
                buf.put_ssh_string(b"");
            }
            Message::ChannelWindowAdjust {
                recipient_channel,
                bytes_to_add,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_u32(*bytes_to_add);
            }
            Message::ChannelData {
                recipient_channel,
                data,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_ssh_string(data);
            }
            Message::ChannelExtendedData {
                recipient_channel,
                data_type,
                data,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_u32(*data_type);
                buf.put_ssh_string(data);
            }
            Message::ChannelEof { recipient_channel }
            | Message::ChannelClose { recipient_channel }
            | Message::ChannelSuccess { recipient_channel }
            | Message::ChannelFailure { recipient_channel } => buf.put_u32(*recipient_channel),
            Message::ChannelRequest {
                recipient_channel,
                want_reply,
                request,
            } => {
                buf.put_u32(*recipient_channel);
                buf.put_ssh_string(request.name().as_bytes());
                buf.put_ssh_bool(*want_reply);
                encode_channel_request(request, buf);
            }
            Message::Unknown { .. } => {}
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Userauth requests are parsed leniently: whatever fields are readable are
/// kept and the method degrades to [`AuthMethod::Malformed`].
fn parse_userauth(r: &mut WireReader<'_>) -> UserauthRequest {
    let mut request = UserauthRequest {
        user: String::new(),
        service: String::new(),
        method: AuthMethod::Malformed,
    };
    let Ok(user) = r.read_text("user name") else {
        return request;
    };
    request.user = user;
    let Ok(service) = r.read_text("service name") else {
        return request;
    };
    request.service = service;
    let Ok(method) = r.read_text("method name") else {
        return request;
    };
    request.method = match method.as_str() {
        "none" => AuthMethod::None,
        "password" => {
            let password = r
                .read_bool("change password")
                .and_then(|_| r.read_text("password"));
            match password {
                Ok(password) => AuthMethod::Password { password },
                Err(_) => AuthMethod::Malformed,
            }
        }
        "publickey" => {
            let algorithm = r
                .read_bool("has signature")
                .and_then(|_| r.read_text("public key algorithm"));
            match algorithm {
                Ok(algorithm) => AuthMethod::PublicKey { algorithm },
                Err(_) => AuthMethod::Malformed,
            }
        }
        "keyboard-interactive" => AuthMethod::KeyboardInteractive,
        _ => AuthMethod::Other(method),
    };
    request
}

fn parse_channel_request(name: String, r: &mut WireReader<'_>) -> CodecResult<ChannelRequest> {
    Ok(match name.as_str() {
        "pty-req" => ChannelRequest::PtyReq {
            term: r.read_text("TERM")?,
            columns: r.read_u32("terminal width")?,
            rows: r.read_u32("terminal height")?,
        },
        "shell" => ChannelRequest::Shell,
        "exec" => ChannelRequest::Exec {
            command: r.read_text("command")?,
        },
        "env" => ChannelRequest::Env {
            name: r.read_text("variable name")?,
            value: r.read_text("variable value")?,
        },
        "window-change" => ChannelRequest::WindowChange {
            columns: r.read_u32("terminal width")?,
            rows: r.read_u32("terminal height")?,
        },
        "subsystem" => ChannelRequest::Subsystem {
            name: r.read_text("subsystem name")?,
        },
        "exit-status" => ChannelRequest::ExitStatus(r.read_u32("exit status")?),
        _ => ChannelRequest::Other(name),
    })
}

fn encode_channel_request(request: &ChannelRequest, buf: &mut BytesMut) {
    match request {
        ChannelRequest::PtyReq {
            term,
            columns,
            rows,
        } => {
            buf.put_ssh_string(term.as_bytes());
            buf.put_u32(*columns);
            buf.put_u32(*rows);
            buf.put_u32(0);
            buf.put_u32(0);
            buf.put_ssh_string(&[0]);
        }
        ChannelRequest::Exec { command } => buf.put_ssh_string(command.as_bytes()),
        ChannelRequest::Env { name, value } => {
            buf.put_ssh_string(name.as_bytes());
            buf.put_ssh_string(value.as_bytes());
        }
        ChannelRequest::WindowChange { columns, rows } => {
            buf.put_u32(*columns);
            buf.put_u32(*rows);
            buf.put_u32(0);
            buf.put_u32(0);
        }
        ChannelRequest::Subsystem { name } => buf.put_ssh_string(name.as_bytes()),
        ChannelRequest::ExitStatus(status) => buf.put_u32(*status),
        ChannelRequest::Shell | ChannelRequest::Other(_) => {}
    }
}
