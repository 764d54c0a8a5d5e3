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

//! Keystroke assembly for the fake shell
//!
//! Interactive clients send one keystroke per `SSH_MSG_CHANNEL_DATA` and
//! expect the server to echo. [`LineEditor`] turns raw channel bytes into
//! [`LineEvent`]s and produces the echo when a pseudo-terminal was requested.

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DELETE: u8 = 0x7f;

/// Longest line kept; further input is dropped until the line ends
pub const MAX_LINE_BYTES: usize = 4096;

/// Result of feeding bytes to a [`LineEditor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Bytes to echo back to the peer
    Echo(Vec<u8>),
    /// A complete line, without its terminator
    Line(String),
    /// Ctrl-C
    Interrupt,
    /// Ctrl-D on an empty line
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Escape {
    #[default]
    None,
    Start,
    Sequence,
}

/// Line assembly state
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
    echo: bool,
    escape: Escape,
    after_cr: bool,
}

impl LineEditor {
    /// Create an editor; `echo` is enabled once a pseudo-terminal is requested
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Turn echo on or off
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Bytes of the line being typed
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Process raw channel bytes
    pub fn feed(&mut self, data: &[u8]) -> Vec<LineEvent> {
        let mut events = Vec::new();
        let mut echo = Vec::new();

        for &byte in data {
            let after_cr = std::mem::take(&mut self.after_cr);

            match self.escape {
                Escape::Start => {
                    self.escape = if byte == b'[' || byte == b'O' {
                        Escape::Sequence
                    } else {
                        Escape::None
                    };
                    continue;
                }
                Escape::Sequence => {
                    if (0x40..=0x7e).contains(&byte) {
                        self.escape = Escape::None;
                    }
                    continue;
                }
                Escape::None => {}
            }

            match byte {
                b'\n' if after_cr => {}
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    echo.extend_from_slice(b"\r\n");
                    self.flush_echo(&mut echo, &mut events);
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    events.push(LineEvent::Line(line));
                }
                BACKSPACE | DELETE => {
                    if self.erase_char() {
                        echo.extend_from_slice(b"\x08 \x08");
                    }
                }
                CTRL_C => {
                    self.buffer.clear();
                    echo.extend_from_slice(b"^C");
                    self.flush_echo(&mut echo, &mut events);
                    events.push(LineEvent::Interrupt);
                }
                CTRL_D => {
                    if self.buffer.is_empty() {
                        self.flush_echo(&mut echo, &mut events);
                        events.push(LineEvent::EndOfInput);
                    }
                }
                ESC => self.escape = Escape::Start,
                b'\t' => self.push(byte, &mut echo),
                byte if byte < 0x20 => {}
                byte => self.push(byte, &mut echo),
            }
        }

        self.flush_echo(&mut echo, &mut events);
        events
    }

    fn push(&mut self, byte: u8, echo: &mut Vec<u8>) {
        if self.buffer.len() < MAX_LINE_BYTES {
            self.buffer.push(byte);
            echo.push(byte);
        }
    }

    /// Remove the last character, honouring UTF-8 continuation bytes
    fn erase_char(&mut self) -> bool {
        let Some(mut index) = self.buffer.len().checked_sub(1) else {
            return false;
        };
        while index > 0 && self.buffer[index] & 0xc0 == 0x80 {
            index -= 1;
        }
        self.buffer.truncate(index);
        true
    }

    fn flush_echo(&self, echo: &mut Vec<u8>, events: &mut Vec<LineEvent>) {
        if self.echo && !echo.is_empty() {
            events.push(LineEvent::Echo(std::mem::take(echo)));
        } else {
            echo.clear();
        }
    }
}
