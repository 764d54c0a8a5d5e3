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

//! # Decoy Line Codec
//!
//! Decodes the byte stream of a plaintext login session into text lines.
//! Raw TCP clients and telnet clients are both handled: telnet commands,
//! option negotiation and subnegotiation are stripped before a line is
//! assembled, so a bot that opens with `IAC DO ECHO` still yields a clean
//! username.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use decoy_linecodec::LineCodec;
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
//! let mut framed = Framed::new(stream, LineCodec::new());
//! framed.send("Login: ").await?;
//! if let Some(line) = framed.next().await {
//!     println!("user typed {:?}", line?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod codec;
pub mod consts;
mod result;

pub use self::codec::LineCodec;
pub use self::result::{LineCodecError, LineCodecResult};
