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

//! Telnet and line-discipline byte values (RFC 854)

/// Null
pub const NUL: u8 = 0x00;
/// Line Feed
pub const LF: u8 = 0x0A;
/// Carriage Return
pub const CR: u8 = 0x0D;

/// Subnegotiation End
pub const SE: u8 = 240;
/// Subnegotiation Begin
pub const SB: u8 = 250;
/// WILL
pub const WILL: u8 = 251;
/// WONT
pub const WONT: u8 = 252;
/// DO
pub const DO: u8 = 253;
/// DONT
pub const DONT: u8 = 254;
/// Interpret As Command
pub const IAC: u8 = 255;

/// Default maximum line length in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;
