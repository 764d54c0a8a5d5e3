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

//! Decoy Service
//!
//! Deception listeners that impersonate an SSH server and a plaintext
//! (telnet-like) login prompt. Every credential pair and every command an
//! intruder submits is recorded to a capture log; access is never granted.
//!
//! - Credentials are always rejected, however many times they are tried
//! - Commands typed at the fake shell are answered `command not found`
//! - One task per connection, capped per listener
//! - Shutdown stops accepting, lets running sessions finish, then flushes
//!   the capture log
//!
//! # Architecture
//!
//! ```text
//! LifecycleController
//!     ↓
//! DecoyListener (ssh)          DecoyListener (plaintext)
//!     ↓                            ↓
//! SessionManager               SessionManager
//!     ↓                            ↓
//! SshEmulator                  PlaintextEmulator
//!     ↘                          ↙
//!              CaptureLog → CaptureSink
//! ```
//!
//! # Example
//!
//! ```no_run
//! use decoy_service::{DecoyConfig, LifecycleController, WriterSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = WriterSink::append_file("capture.log").await?;
//!     let controller = LifecycleController::start(DecoyConfig::default(), sink).await?;
//!     let report = controller.run_until_signal().await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

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

mod capture;
mod config;
mod error;
mod handler;
mod lifecycle;
mod listener;
mod manager;
mod metrics;
pub mod plaintext;
pub mod ssh;
mod types;

pub use capture::{CaptureLog, CaptureSink, CaptureSummary, CaptureWriter, MemorySink, WriterSink};
pub use config::{DecoyConfig, ListenerConfig, PlaintextConfig, SshConfig};
pub use error::{DecoyError, Result};
pub use handler::SessionEmulator;
pub use lifecycle::{LifecycleController, ShutdownReport, wait_for_signal};
pub use listener::DecoyListener;
pub use manager::{SessionContext, SessionManager};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use plaintext::PlaintextEmulator;
pub use ssh::SshEmulator;
pub use types::{
    AuthAttempt, AuthOutcome, CaptureEvent, CaptureRecord, CommandEvent, Connection, ConnectionId,
    ListenerSnapshot, Protocol, SessionOutcome,
};
