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

/// Result Type for Line Codec Operations
pub type LineCodecResult<T> = Result<T, LineCodecError>;

/// Errors raised by [`LineCodec`](crate::LineCodec).
///
/// Decoding itself never fails: malformed telnet sequences are dropped and
/// overlong lines are truncated. Only the underlying stream can fail.
#[derive(Debug, thiserror::Error)]
pub enum LineCodecError {
    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
