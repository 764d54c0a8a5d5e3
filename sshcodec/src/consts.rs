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

//! SSH-2 protocol constants (RFC 4250 §4)

/// Message numbers
pub mod msg {
    /// SSH_MSG_DISCONNECT
    pub const DISCONNECT: u8 = 1;
    /// SSH_MSG_IGNORE
    pub const IGNORE: u8 = 2;
    /// SSH_MSG_UNIMPLEMENTED
    pub const UNIMPLEMENTED: u8 = 3;
    /// SSH_MSG_DEBUG
    pub const DEBUG: u8 = 4;
    /// SSH_MSG_SERVICE_REQUEST
    pub const SERVICE_REQUEST: u8 = 5;
    /// SSH_MSG_SERVICE_ACCEPT
    pub const SERVICE_ACCEPT: u8 = 6;
    /// SSH_MSG_KEXINIT
    pub const KEXINIT: u8 = 20;
    /// SSH_MSG_NEWKEYS
    pub const NEWKEYS: u8 = 21;
    /// SSH_MSG_KEX_ECDH_INIT
    pub const KEX_ECDH_INIT: u8 = 30;
    /// SSH_MSG_KEX_ECDH_REPLY
    pub const KEX_ECDH_REPLY: u8 = 31;
    /// SSH_MSG_USERAUTH_REQUEST
    pub const USERAUTH_REQUEST: u8 = 50;
    /// SSH_MSG_USERAUTH_FAILURE
    pub const USERAUTH_FAILURE: u8 = 51;
    /// SSH_MSG_USERAUTH_SUCCESS
    pub const USERAUTH_SUCCESS: u8 = 52;
    /// SSH_MSG_USERAUTH_BANNER
    pub const USERAUTH_BANNER: u8 = 53;
    /// SSH_MSG_GLOBAL_REQUEST
    pub const GLOBAL_REQUEST: u8 = 80;
    /// SSH_MSG_REQUEST_SUCCESS
    pub const REQUEST_SUCCESS: u8 = 81;
    /// SSH_MSG_REQUEST_FAILURE
    pub const REQUEST_FAILURE: u8 = 82;
    /// SSH_MSG_CHANNEL_OPEN
    pub const CHANNEL_OPEN: u8 = 90;
    /// SSH_MSG_CHANNEL_OPEN_CONFIRMATION
    pub const CHANNEL_OPEN_CONFIRMATION: u8 = 91;
    /// SSH_MSG_CHANNEL_OPEN_FAILURE
    pub const CHANNEL_OPEN_FAILURE: u8 = 92;
    /// SSH_MSG_CHANNEL_WINDOW_ADJUST
    pub const CHANNEL_WINDOW_ADJUST: u8 = 93;
    /// SSH_MSG_CHANNEL_DATA
    pub const CHANNEL_DATA: u8 = 94;
    /// SSH_MSG_CHANNEL_EXTENDED_DATA
    pub const CHANNEL_EXTENDED_DATA: u8 = 95;
    /// SSH_MSG_CHANNEL_EOF
    pub const CHANNEL_EOF: u8 = 96;
    /// SSH_MSG_CHANNEL_CLOSE
    pub const CHANNEL_CLOSE: u8 = 97;
    /// SSH_MSG_CHANNEL_REQUEST
    pub const CHANNEL_REQUEST: u8 = 98;
    /// SSH_MSG_CHANNEL_SUCCESS
    pub const CHANNEL_SUCCESS: u8 = 99;
    /// SSH_MSG_CHANNEL_FAILURE
    pub const CHANNEL_FAILURE: u8 = 100;
}

/// Disconnect reason codes
pub mod disconnect {
    /// SSH_DISCONNECT_PROTOCOL_ERROR
    pub const PROTOCOL_ERROR: u32 = 2;
    /// SSH_DISCONNECT_KEY_EXCHANGE_FAILED
    pub const KEY_EXCHANGE_FAILED: u32 = 3;
    /// SSH_DISCONNECT_MAC_ERROR
    pub const MAC_ERROR: u32 = 5;
    /// SSH_DISCONNECT_SERVICE_NOT_AVAILABLE
    pub const SERVICE_NOT_AVAILABLE: u32 = 7;
    /// SSH_DISCONNECT_BY_APPLICATION
    pub const BY_APPLICATION: u32 = 11;
    /// SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE
    pub const NO_MORE_AUTH_METHODS_AVAILABLE: u32 = 14;
}

/// Channel open failure reason codes
pub mod open_failure {
    /// SSH_OPEN_ADMINISTRATIVELY_PROHIBITED
    pub const ADMINISTRATIVELY_PROHIBITED: u32 = 1;
    /// SSH_OPEN_UNKNOWN_CHANNEL_TYPE
    pub const UNKNOWN_CHANNEL_TYPE: u32 = 3;
    /// SSH_OPEN_RESOURCE_SHORTAGE
    pub const RESOURCE_SHORTAGE: u32 = 4;
}

/// Maximum binary packet length accepted from a peer (RFC 4253 §6.1).
pub const MAX_PACKET_LENGTH: usize = 35_000;

/// Minimum random padding per packet.
pub const MIN_PADDING: usize = 4;

/// Maximum length of an identification line, CR LF included.
pub const MAX_IDENTIFICATION_LENGTH: usize = 255;

/// Maximum number of non-identification lines tolerated before the banner.
pub const MAX_PREAMBLE_LINES: usize = 16;
