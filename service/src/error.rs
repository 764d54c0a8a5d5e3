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

//! Error types for the decoy service

use std::net::SocketAddr;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, DecoyError>;

/// Decoy service error types
#[derive(Debug, Error)]
pub enum DecoyError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH transport error
    #[error("SSH codec error: {0}")]
    Codec(#[from] decoy_sshcodec::CodecError),

    /// Plaintext line codec error
    #[error("Line codec error: {0}")]
    LineCodec(#[from] decoy_linecodec::LineCodecError),

    /// The listening socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: SocketAddr,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The peer broke the handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The peer took too long
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// The peer went away
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration was rejected by `validate()`
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start()` was called twice
    #[error("Listener already running")]
    ListenerAlreadyRunning,

    /// `shutdown()` was called on a stopped listener
    #[error("Listener not running")]
    ListenerNotRunning,

    /// The listener was shut down and cannot be restarted
    #[error("Listener closed")]
    ListenerClosed,

    /// Maximum number of concurrent sessions reached
    #[error("Maximum sessions ({0}) reached")]
    MaxSessionsReached(usize),
}

impl DecoyError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors end one session at most; the listener keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecoyError::Timeout(_)
                | DecoyError::ConnectionClosed
                | DecoyError::Io(_)
                | DecoyError::MaxSessionsReached(_)
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DecoyError::ConnectionClosed | DecoyError::Io(_) | DecoyError::LineCodec(_)
        )
    }

    /// Check if the error is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, DecoyError::Codec(_) | DecoyError::Handshake(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_recoverable() {
        assert!(DecoyError::Timeout("authentication").is_recoverable());
        assert!(DecoyError::ConnectionClosed.is_recoverable());
        assert!(!DecoyError::ListenerNotRunning.is_recoverable());
        assert!(!DecoyError::InvalidConfig("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_is_connection_error() {
        assert!(DecoyError::ConnectionClosed.is_connection_error());
        assert!(DecoyError::Io(std::io::ErrorKind::BrokenPipe.into()).is_connection_error());
        assert!(!DecoyError::Timeout("handshake").is_connection_error());
    }

    #[test]
    fn test_error_is_protocol_error() {
        assert!(DecoyError::Handshake("no kexinit".into()).is_protocol_error());
        assert!(
            DecoyError::Codec(decoy_sshcodec::CodecError::MacMismatch { sequence: 3 })
                .is_protocol_error()
        );
        assert!(!DecoyError::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = DecoyError::Bind {
            address: "127.0.0.1:2222".parse().unwrap(),
            source: std::io::ErrorKind::AddrInUse.into(),
        };
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:2222"));

        let err = DecoyError::MaxSessionsReached(256);
        assert_eq!(err.to_string(), "Maximum sessions (256) reached");

        let err = DecoyError::Timeout("shell request");
        assert_eq!(err.to_string(), "Timed out during shell request");
    }
}
