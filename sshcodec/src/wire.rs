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

//! SSH data type representations (RFC 4251 §5)
//!
//! [`WireReader`] performs bounds-checked reads over a message payload and
//! never panics on short input. [`WireWrite`] appends the same encodings to
//! any [`BufMut`].

use crate::{CodecError, CodecResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::BufMut;

/// Bounds-checked cursor over an SSH message payload.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    /// Create a reader over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the unconsumed remainder.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> CodecResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(CodecError::truncated(field, len, self.buf.len()));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self, field: &'static str) -> CodecResult<u8> {
        Ok(self.read_bytes(1, field)?[0])
    }

    /// Read a boolean; any non-zero value is true.
    pub fn read_bool(&mut self, field: &'static str) -> CodecResult<bool> {
        Ok(self.read_u8(field)? != 0)
    }

    /// Read a big-endian `uint32`.
    pub fn read_u32(&mut self, field: &'static str) -> CodecResult<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4, field)?))
    }

    /// Read a length-prefixed `string` as raw bytes.
    pub fn read_string(&mut self, field: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.read_u32(field)? as usize;
        self.read_bytes(len, field)
    }

    /// Read a `string` and decode it as UTF-8, replacing invalid sequences.
    ///
    /// Attacker-supplied names and passwords are frequently not valid UTF-8;
    /// lossy decoding keeps them recordable.
    pub fn read_text(&mut self, field: &'static str) -> CodecResult<String> {
        Ok(String::from_utf8_lossy(self.read_string(field)?).into_owned())
    }

    /// Read a comma-separated `name-list`.
    pub fn read_name_list(&mut self, field: &'static str) -> CodecResult<Vec<String>> {
        let raw = self.read_string(field)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidField {
            field,
            reason: "name-list is not ASCII".to_string(),
        })?;
        Ok(text.split(',').map(str::to_string).collect())
    }
}

/// Appends SSH wire encodings to a buffer.
pub trait WireWrite {
    /// Append a boolean.
    fn put_ssh_bool(&mut self, value: bool);

    /// Append a length-prefixed `string`.
    fn put_ssh_string(&mut self, value: &[u8]);

    /// Append a `name-list`.
    fn put_name_list<S: AsRef<str>>(&mut self, names: &[S]);

    /// Append an unsigned big-endian magnitude as an `mpint`.
    fn put_mpint(&mut self, magnitude: &[u8]);
}

impl<B: BufMut> WireWrite for B {
    fn put_ssh_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    fn put_ssh_string(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.put_slice(value);
    }

    fn put_name_list<S: AsRef<str>>(&mut self, names: &[S]) {
        let joined = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.put_ssh_string(joined.as_bytes());
    }

    fn put_mpint(&mut self, magnitude: &[u8]) {
        let first = magnitude.iter().position(|&b| b != 0);
        match first {
            None => self.put_u32(0),
            Some(start) => {
                let digits = &magnitude[start..];
                if digits[0] & 0x80 != 0 {
                    self.put_u32(digits.len() as u32 + 1);
                    self.put_u8(0);
                } else {
                    self.put_u32(digits.len() as u32);
                }
                self.put_slice(digits);
            }
        }
    }
}
