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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while framing, parsing, or protecting SSH transport traffic.
///
/// Every variant is a per-connection failure. None of them are recoverable on
/// the same connection: once a peer sends something the codec rejects, the
/// transport is torn down.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer identification line was not an acceptable SSH-2 banner.
    #[error("invalid identification: {0}")]
    InvalidIdentification(String),

    /// A binary packet header or padding was malformed.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The declared packet length exceeds the transport limit.
    #[error("packet of {length} bytes exceeds limit of {limit} bytes")]
    PacketTooLarge {
        /// Length declared by the peer
        length: usize,
        /// Maximum length this codec accepts
        limit: usize,
    },

    /// MAC verification of an inbound packet failed.
    #[error("message authentication failed for packet {sequence}")]
    MacMismatch {
        /// Sequence number of the offending packet
        sequence: u32,
    },

    /// A message payload ended before a field could be read.
    #[error("truncated {field}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Name of the field being decoded
        field: &'static str,
        /// Bytes required to decode the field
        needed: usize,
        /// Bytes remaining in the payload
        available: usize,
    },

    /// A message carried a structurally invalid field.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the field being decoded
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// No mutually supported algorithm exists for a negotiation category.
    #[error("no common {category} algorithm (peer offered: {offered})")]
    NoCommonAlgorithm {
        /// Negotiation category, e.g. "kex" or "cipher"
        category: &'static str,
        /// The peer's comma-separated offer
        offered: String,
    },

    /// Key exchange failed, e.g. a low-order X25519 point.
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    /// Key material could not be turned into a cipher or MAC instance.
    #[error("invalid key material for {0}")]
    InvalidKeyMaterial(&'static str),
}

impl CodecError {
    /// Convenience constructor for [`CodecError::Truncated`].
    pub fn truncated(field: &'static str, needed: usize, available: usize) -> Self {
        CodecError::Truncated {
            field,
            needed,
            available,
        }
    }

    /// Check if the error indicates the peer spoke something other than SSH-2.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidIdentification(_)
                | CodecError::NoCommonAlgorithm { .. }
                | CodecError::KeyExchange(_)
        )
    }
}
