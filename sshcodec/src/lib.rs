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

//! # Decoy SSH Transport Codec
//!
//! A deliberately small SSH-2 transport for services that need to look like
//! an SSH server without ever granting access. It covers exactly the part of
//! the protocol a client walks through before it can type a command:
//!
//! - **Version exchange** (RFC 4253 §4.2): [`Identification`] and the
//!   identification phase of [`SshCodec`]
//! - **Binary packet protocol** (RFC 4253 §6): framing, padding, sequence
//!   numbers, `aes128-ctr`/`aes256-ctr` and `hmac-sha2-256`/`hmac-sha2-512`
//! - **Key exchange** (RFC 8731): `curve25519-sha256` with an `ssh-ed25519`
//!   host key, see [`kex`] and [`HostKey`]
//! - **Messages**: the transport, userauth and connection layer messages in
//!   [`Message`]
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use decoy_sshcodec::{Message, SshCodec, SshFrame};
//! use futures::{SinkExt, StreamExt};
//! use tokio::io::AsyncWriteExt;
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example(mut stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
//! stream.write_all(b"SSH-2.0-OpenSSH_8.9p1\r\n").await?;
//! let mut framed = Framed::new(stream, SshCodec::new());
//! while let Some(frame) = framed.next().await {
//!     match frame? {
//!         SshFrame::Identification(id) => println!("client: {id}"),
//!         SshFrame::Packet(packet) => {
//!             if let Message::Ignore = packet.message()? {
//!                 continue;
//!             }
//!             framed
//!                 .send(Message::Unimplemented { sequence: packet.sequence })
//!                 .await?;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Installation
//!
//! The codec does not run the key exchange itself. After computing keys the
//! caller installs the outbound direction right after sending
//! `SSH_MSG_NEWKEYS` and stages the inbound direction; the decoder switches
//! to it on the packet that follows the peer's `SSH_MSG_NEWKEYS`.
//!
//! ## Thread Safety
//!
//! `SshCodec` holds per-connection cipher state and must not be shared
//! between connections.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]

pub mod cipher;
mod codec;
pub mod consts;
pub mod hostkey;
mod ident;
pub mod kex;
mod message;
mod result;
pub mod wire;

pub use self::cipher::{CipherAlgorithm, DirectionKeys, MacAlgorithm};
pub use self::codec::{Packet, SshCodec, SshFrame};
pub use self::hostkey::HostKey;
pub use self::ident::{Identification, IdentificationReader};
pub use self::kex::{KexInit, Negotiated, SessionKeys};
pub use self::message::{AuthMethod, ChannelRequest, Message, UserauthRequest};
pub use self::result::{CodecError, CodecResult};
