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

//! Protocol version exchange (RFC 4253 §4.2)

use crate::consts::{MAX_IDENTIFICATION_LENGTH, MAX_PREAMBLE_LINES};
use crate::{CodecError, CodecResult};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tracing::trace;

/// An SSH identification string without its trailing CR LF.
///
/// The exact bytes are part of the exchange hash, so the value is kept
/// verbatim rather than parsed into components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identification(String);

impl Identification {
    /// Validate and wrap an identification string.
    ///
    /// The string must start with `SSH-2.0-` or `SSH-1.99-` and contain no
    /// CR or LF.
    pub fn new(value: impl Into<String>) -> CodecResult<Self> {
        let value = value.into();
        if value.len() + 2 > MAX_IDENTIFICATION_LENGTH {
            return Err(CodecError::InvalidIdentification(format!(
                "identification exceeds {MAX_IDENTIFICATION_LENGTH} bytes"
            )));
        }
        if value.contains(['\r', '\n']) {
            return Err(CodecError::InvalidIdentification(
                "identification contains a line break".to_string(),
            ));
        }
        let rest = value
            .strip_prefix("SSH-2.0-")
            .or_else(|| value.strip_prefix("SSH-1.99-"))
            .ok_or_else(|| {
                CodecError::InvalidIdentification(format!(
                    "unsupported protocol version in {:?}",
                    value
                ))
            })?;
        if rest.is_empty() {
            return Err(CodecError::InvalidIdentification(
                "missing software version".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The identification as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identification bytes used in the exchange hash.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The software version field, e.g. `OpenSSH_8.9p1 Ubuntu-3ubuntu0.6`.
    pub fn software(&self) -> &str {
        let rest = self.0.splitn(3, '-').nth(2).unwrap_or_default();
        rest.split(' ').next().unwrap_or_default()
    }

    /// Append the identification line, CR LF included.
    pub fn write_line(&self, dst: &mut BytesMut) {
        dst.reserve(self.0.len() + 2);
        dst.put_slice(self.0.as_bytes());
        dst.put_slice(b"\r\n");
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental reader for the peer's identification line.
///
/// Lines that do not begin with `SSH-` are skipped, up to a fixed number, as
/// permitted for servers. Clients that send anything else are rejected.
#[derive(Debug, Default)]
pub struct IdentificationReader {
    skipped: usize,
}

impl IdentificationReader {
    /// Create a reader that has not yet seen any preamble.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of preamble lines skipped so far.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    /// Consume complete lines from `src` until an identification is found.
    ///
    /// Returns `Ok(None)` when more input is required.
    pub fn decode(&mut self, src: &mut BytesMut) -> CodecResult<Option<Identification>> {
        loop {
            let Some(newline) = src.iter().position(|&b| b == b'\n') else {
                if src.len() >= MAX_IDENTIFICATION_LENGTH {
                    return Err(CodecError::InvalidIdentification(
                        "unterminated identification line".to_string(),
                    ));
                }
                return Ok(None);
            };
            if newline + 1 > MAX_IDENTIFICATION_LENGTH {
                return Err(CodecError::InvalidIdentification(
                    "identification line too long".to_string(),
                ));
            }
            let line = src.split_to(newline + 1);
            let mut body = &line[..line.len() - 1];
            if body.last() == Some(&b'\r') {
                body = &body[..body.len() - 1];
            }

            if body.starts_with(b"SSH-") {
                let text = std::str::from_utf8(body).map_err(|_| {
                    CodecError::InvalidIdentification("identification is not ASCII".to_string())
                })?;
                return Identification::new(text).map(Some);
            }

            self.skipped += 1;
            trace!(skipped = self.skipped, "Skipping identification preamble line");
            if self.skipped > MAX_PREAMBLE_LINES {
                return Err(CodecError::InvalidIdentification(
                    "too many lines before identification".to_string(),
                ));
            }
            if !src.has_remaining() {
                return Ok(None);
            }
        }
    }
}
