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

use crate::consts::{self, DEFAULT_MAX_LINE_LENGTH};
use crate::LineCodecError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// A codec that turns a raw or telnet byte stream into text lines.
///
/// Telnet command, negotiation and subnegotiation sequences are consumed
/// silently, so clients that open with option negotiation still produce
/// clean lines. `IAC IAC` is kept as a literal `0xFF`.
///
/// A line ends at LF, CR, CR LF or CR NUL. Bytes past the maximum line
/// length are discarded until the next terminator; the truncated line is
/// still delivered.
#[derive(Debug)]
pub struct LineCodec {
    line: Vec<u8>,
    state: DecoderState,
    max_line_length: usize,
    overflowed: bool,
}

impl LineCodec {
    /// Creates a codec with the default 1024 byte line limit.
    pub fn new() -> LineCodec {
        LineCodec::default()
    }

    /// Creates a codec with a custom line limit.
    pub fn with_max_line_length(max_line_length: usize) -> LineCodec {
        LineCodec {
            max_line_length,
            ..LineCodec::default()
        }
    }

    /// The configured line limit.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn push(&mut self, byte: u8) {
        if self.line.len() < self.max_line_length {
            self.line.push(byte);
        } else if !self.overflowed {
            self.overflowed = true;
            warn!(
                limit = self.max_line_length,
                "Line exceeds maximum length, truncating"
            );
        }
    }

    fn take_line(&mut self) -> String {
        self.overflowed = false;
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        line
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        LineCodec {
            line: Vec::with_capacity(64),
            state: DecoderState::NormalData,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            overflowed: false,
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        while src.has_remaining() {
            // LF or NUL directly after CR belongs to the same terminator.
            if let DecoderState::CarriageReturn = self.state {
                self.state = DecoderState::NormalData;
                if matches!(src[0], consts::LF | consts::NUL) {
                    src.advance(1);
                    continue;
                }
            }

            let byte = src.get_u8();
            match (self.state, byte) {
                (DecoderState::NormalData, consts::IAC) => {
                    self.state = DecoderState::InterpretAsCommand;
                }
                (DecoderState::NormalData, consts::CR) => {
                    self.state = DecoderState::CarriageReturn;
                    return Ok(Some(self.take_line()));
                }
                (DecoderState::NormalData, consts::LF) => {
                    return Ok(Some(self.take_line()));
                }
                (DecoderState::NormalData, _) => {
                    self.push(byte);
                }
                (DecoderState::InterpretAsCommand, consts::IAC) => {
                    self.state = DecoderState::NormalData;
                    self.push(consts::IAC);
                }
                (
                    DecoderState::InterpretAsCommand,
                    consts::DO | consts::DONT | consts::WILL | consts::WONT,
                ) => {
                    self.state = DecoderState::Negotiate;
                }
                (DecoderState::InterpretAsCommand, consts::SB) => {
                    self.state = DecoderState::Subnegotiate;
                }
                (DecoderState::InterpretAsCommand, _) => {
                    trace!("Dropping telnet command {:#X}", byte);
                    self.state = DecoderState::NormalData;
                }
                (DecoderState::Negotiate, _) => {
                    trace!("Dropping telnet negotiation for option {}", byte);
                    self.state = DecoderState::NormalData;
                }
                (DecoderState::Subnegotiate, consts::IAC) => {
                    self.state = DecoderState::SubnegotiateIAC;
                }
                (DecoderState::Subnegotiate, _) => {}
                (DecoderState::SubnegotiateIAC, consts::SE) => {
                    self.state = DecoderState::NormalData;
                }
                (DecoderState::SubnegotiateIAC, _) => {
                    self.state = DecoderState::Subnegotiate;
                }
                (DecoderState::CarriageReturn, _) => {
                    // Handled before the byte is consumed.
                    self.state = DecoderState::NormalData;
                    self.push(byte);
                }
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if self.line.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.take_line()))
    }
}

impl Encoder<&str> for LineCodec {
    type Error = LineCodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&[u8]>::encode(self, item.as_bytes(), dst)
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = LineCodecError;

    /// Writes `item`, doubling any `IAC` byte.
    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        for &byte in item {
            if byte == consts::IAC {
                dst.put_u8(consts::IAC);
            }
            dst.put_u8(byte);
        }
        Ok(())
    }
}

/// Decoder position within the telnet byte stream.
#[derive(Clone, Copy, Debug)]
enum DecoderState {
    /// Normal Data
    NormalData,
    /// Received CR, a following LF or NUL is part of the terminator
    CarriageReturn,
    /// Received IAC, Next byte is Command
    InterpretAsCommand,
    /// Received DO/DONT/WILL/WONT, Next byte is the option
    Negotiate,
    /// Inside a subnegotiation
    Subnegotiate,
    /// Received IAC inside a subnegotiation
    SubnegotiateIAC,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    // ============================================================================
    // Helper Functions
    // ============================================================================

    fn collect_all(codec: &mut LineCodec, mut src: BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut src).expect("decode should not error") {
            out.push(line);
        }
        out
    }

    // ============================================================================
    // Line Terminators
    // ============================================================================

    #[test]
    fn decode_all_terminators() {
        let mut codec = LineCodec::new();
        let lines = collect_all(
            &mut codec,
            BytesMut::from(&b"crlf\r\nlf\ncr\rnul\r\0last\n"[..]),
        );
        assert_eq!(lines, vec!["crlf", "lf", "cr", "nul", "last"]);
    }

    #[test]
    fn decode_crlf_split_across_reads() {
        let mut codec = LineCodec::new();
        let mut src = BytesMut::from(&b"admin\r"[..]);
        assert_eq!(codec.decode(&mut src).unwrap(), Some("admin".to_string()));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.put_slice(b"\n1234\r\n");
        assert_eq!(codec.decode(&mut src).unwrap(), Some("1234".to_string()));
    }

    #[test]
    fn decode_empty_lines() {
        let mut codec = LineCodec::new();
        let lines = collect_all(&mut codec, BytesMut::from(&b"\r\n\n"[..]));
        assert_eq!(lines, vec!["", ""]);
    }

    // ============================================================================
    // Telnet Sequences
    // ============================================================================

    #[test]
    fn decode_strips_negotiation() {
        let mut codec = LineCodec::new();
        let src = BytesMut::from(
            &[
                consts::IAC,
                consts::DO,
                1,
                consts::IAC,
                consts::WILL,
                31,
                b'r',
                b'o',
                b'o',
                b't',
                consts::CR,
                consts::LF,
            ][..],
        );
        assert_eq!(collect_all(&mut codec, src), vec!["root"]);
    }

    #[test]
    fn decode_strips_subnegotiation() {
        let mut codec = LineCodec::new();
        let src = BytesMut::from(
            &[
                b'a',
                consts::IAC,
                consts::SB,
                24,
                0,
                b'x',
                b't',
                consts::IAC,
                consts::IAC,
                consts::IAC,
                consts::SE,
                b'b',
                consts::LF,
            ][..],
        );
        assert_eq!(collect_all(&mut codec, src), vec!["ab"]);
    }

    #[test]
    fn decode_escaped_iac_is_data() {
        let mut codec = LineCodec::new();
        let src = BytesMut::from(&[b'x', consts::IAC, consts::IAC, consts::LF][..]);
        assert_eq!(collect_all(&mut codec, src), vec!["x\u{fffd}"]);
    }

    #[test]
    fn decode_two_byte_commands_dropped() {
        let mut codec = LineCodec::new();
        // IAC NOP, IAC AYT
        let src = BytesMut::from(&[b'o', consts::IAC, 241, b'k', consts::IAC, 246, consts::LF][..]);
        assert_eq!(collect_all(&mut codec, src), vec!["ok"]);
    }

    // ============================================================================
    // Limits and EOF
    // ============================================================================

    #[test]
    #[traced_test]
    fn decode_truncates_long_lines() {
        let mut codec = LineCodec::with_max_line_length(4);
        let lines = collect_all(&mut codec, BytesMut::from(&b"abcdefgh\nxy\n"[..]));
        assert_eq!(lines, vec!["abcd", "xy"]);
        assert!(logs_contain("Line exceeds maximum length"));
    }

    #[test]
    fn decode_eof_delivers_partial_line() {
        let mut codec = LineCodec::new();
        let mut src = BytesMut::from(&b"first\npartial"[..]);
        assert_eq!(codec.decode(&mut src).unwrap(), Some("first".to_string()));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut src).unwrap(),
            Some("partial".to_string())
        );
        assert_eq!(codec.decode_eof(&mut src).unwrap(), None);
    }

    #[test]
    fn encode_escapes_iac() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&[b'a', consts::IAC][..], &mut dst).unwrap();
        codec.encode("Login: ", &mut dst).unwrap();
        assert_eq!(&dst[..], b"a\xFF\xFFLogin: ");
    }
}
