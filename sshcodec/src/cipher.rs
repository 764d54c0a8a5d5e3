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

//! Packet encryption and integrity (RFC 4344, RFC 6668)

use crate::{CodecError, CodecResult};
use aes::{Aes128, Aes256};
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use std::fmt;
use zeroize::Zeroizing;

/// Supported encryption algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128 in counter mode
    Aes128Ctr,
    /// AES-256 in counter mode
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Server preference order.
    pub const SUPPORTED: &'static [CipherAlgorithm] =
        &[CipherAlgorithm::Aes128Ctr, CipherAlgorithm::Aes256Ctr];

    /// Algorithm name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Look up an algorithm by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED.iter().copied().find(|alg| alg.name() == name)
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// IV length in bytes.
    pub fn iv_len(self) -> usize {
        16
    }

    /// Cipher block size in bytes.
    pub fn block_size(self) -> usize {
        16
    }
}

/// Supported MAC algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA-256
    HmacSha256,
    /// HMAC-SHA-512
    HmacSha512,
}

impl MacAlgorithm {
    /// Server preference order.
    pub const SUPPORTED: &'static [MacAlgorithm] =
        &[MacAlgorithm::HmacSha256, MacAlgorithm::HmacSha512];

    /// Algorithm name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
            MacAlgorithm::HmacSha512 => "hmac-sha2-512",
        }
    }

    /// Look up an algorithm by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED.iter().copied().find(|alg| alg.name() == name)
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha512 => 64,
        }
    }

    /// Tag length in bytes.
    pub fn mac_len(self) -> usize {
        self.key_len()
    }
}

/// Negotiated algorithms and derived key material for one direction.
pub struct DirectionKeys {
    /// Encryption algorithm
    pub cipher: CipherAlgorithm,
    /// MAC algorithm
    pub mac: MacAlgorithm,
    /// Initial counter block
    pub iv: Zeroizing<Vec<u8>>,
    /// Encryption key
    pub key: Zeroizing<Vec<u8>>,
    /// Integrity key
    pub mac_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("cipher", &self.cipher)
            .field("mac", &self.mac)
            .finish_non_exhaustive()
    }
}

enum Keystream {
    Aes128(Box<Ctr128BE<Aes128>>),
    Aes256(Box<Ctr128BE<Aes256>>),
}

/// Live cipher and MAC state for one direction of a transport.
pub struct PacketProtection {
    keystream: Keystream,
    cipher: CipherAlgorithm,
    mac: MacAlgorithm,
    mac_key: Zeroizing<Vec<u8>>,
}

impl PacketProtection {
    /// Instantiate cipher and MAC state from derived keys.
    pub fn new(keys: &DirectionKeys) -> CodecResult<Self> {
        let keystream = match keys.cipher {
            CipherAlgorithm::Aes128Ctr => Keystream::Aes128(Box::new(
                Ctr128BE::<Aes128>::new_from_slices(&keys.key, &keys.iv)
                    .map_err(|_| CodecError::InvalidKeyMaterial("aes128-ctr"))?,
            )),
            CipherAlgorithm::Aes256Ctr => Keystream::Aes256(Box::new(
                Ctr128BE::<Aes256>::new_from_slices(&keys.key, &keys.iv)
                    .map_err(|_| CodecError::InvalidKeyMaterial("aes256-ctr"))?,
            )),
        };
        if keys.mac_key.len() != keys.mac.key_len() {
            return Err(CodecError::InvalidKeyMaterial(keys.mac.name()));
        }
        Ok(Self {
            keystream,
            cipher: keys.cipher,
            mac: keys.mac,
            mac_key: keys.mac_key.clone(),
        })
    }

    /// Cipher block size in bytes.
    pub fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    /// MAC tag length in bytes.
    pub fn mac_len(&self) -> usize {
        self.mac.mac_len()
    }

    /// Encrypt or decrypt `buf` in place, advancing the counter.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        match &mut self.keystream {
            Keystream::Aes128(cipher) => cipher.apply_keystream(buf),
            Keystream::Aes256(cipher) => cipher.apply_keystream(buf),
        }
    }

    /// Compute `MAC(key, sequence || unencrypted packet)`.
    pub fn sign(&self, sequence: u32, packet: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(match self.mac {
            MacAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(&self.mac_key)
                    .map_err(|_| CodecError::InvalidKeyMaterial("hmac-sha2-256"))?;
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
            MacAlgorithm::HmacSha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(&self.mac_key)
                    .map_err(|_| CodecError::InvalidKeyMaterial("hmac-sha2-512"))?;
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.finalize().into_bytes().to_vec()
            }
        })
    }

    /// Verify a received tag in constant time.
    pub fn verify(&self, sequence: u32, packet: &[u8], tag: &[u8]) -> CodecResult<()> {
        let verified = match self.mac {
            MacAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(&self.mac_key)
                    .map_err(|_| CodecError::InvalidKeyMaterial("hmac-sha2-256"))?;
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.verify_slice(tag).is_ok()
            }
            MacAlgorithm::HmacSha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(&self.mac_key)
                    .map_err(|_| CodecError::InvalidKeyMaterial("hmac-sha2-512"))?;
                mac.update(&sequence.to_be_bytes());
                mac.update(packet);
                mac.verify_slice(tag).is_ok()
            }
        };
        if verified {
            Ok(())
        } else {
            Err(CodecError::MacMismatch { sequence })
        }
    }
}

impl fmt::Debug for PacketProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketProtection")
            .field("cipher", &self.cipher)
            .field("mac", &self.mac)
            .finish_non_exhaustive()
    }
}
