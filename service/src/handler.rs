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

//! Session emulator trait

use crate::{Protocol, Result, SessionContext, SessionOutcome};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Protocol personality run by a listener for each accepted connection
///
/// The listener hands every accepted stream to [`run`](SessionEmulator::run)
/// in its own task. Implementations own the stream until they return and
/// report captures through the [`SessionContext`].
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use decoy_service::{Protocol, Result, SessionContext, SessionEmulator, SessionOutcome};
/// use tokio::io::AsyncWriteExt;
/// use tokio::net::TcpStream;
///
/// struct Tarpit;
///
/// #[async_trait]
/// impl SessionEmulator for Tarpit {
///     fn protocol(&self) -> Protocol {
///         Protocol::Plaintext
///     }
///
///     async fn run(&self, mut stream: TcpStream, _ctx: SessionContext) -> Result<SessionOutcome> {
///         stream.write_all(b"Login: ").await?;
///         Ok(SessionOutcome::Closed)
///     }
/// }
/// ```
#[async_trait]
pub trait SessionEmulator: Send + Sync + 'static {
    /// Protocol this emulator impersonates
    fn protocol(&self) -> Protocol;

    /// Serve one connection until it reaches a terminal state
    ///
    /// Errors end only this session; the listener keeps accepting.
    async fn run(&self, stream: TcpStream, ctx: SessionContext) -> Result<SessionOutcome>;
}
