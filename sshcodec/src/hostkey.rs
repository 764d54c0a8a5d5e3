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

//! `ssh-ed25519` host identity (RFC 8709)

use crate::wire::{WireReader, WireWrite};
use crate::{CodecError, CodecResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Host key algorithm name.
pub const SSH_ED25519: &str = "ssh-ed25519";

/// An Ed25519 server host key.
#[derive(Clone)]
pub struct HostKey {
    signing_key: SigningKey,
}

impl HostKey {
    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a key from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8]) -> CodecResult<Self> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            seed.try_into()
                .map_err(|_| CodecError::InvalidKeyMaterial(SSH_ED25519))?,
        );
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// The algorithm name advertised in KEXINIT.
    pub fn algorithm(&self) -> &'static str {
        SSH_ED25519
    }

    /// Public key blob `string "ssh-ed25519" || string key`.
    pub fn public_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(51);
        blob.put_ssh_string(SSH_ED25519.as_bytes());
        blob.put_ssh_string(self.signing_key.verifying_key().as_bytes());
        blob
    }

    /// Signature blob `string "ssh-ed25519" || string signature` over `data`.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(data);
        let mut blob = Vec::with_capacity(83);
        blob.put_ssh_string(SSH_ED25519.as_bytes());
        blob.put_ssh_string(&signature.to_bytes());
        blob
    }

    /// OpenSSH-style `SHA256:` fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_blob())
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKey")
            .field("algorithm", &SSH_ED25519)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// OpenSSH-style `SHA256:` fingerprint of a public key blob.
pub fn fingerprint(public_blob: &[u8]) -> String {
    let digest = Sha256::digest(public_blob);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Verify a `ssh-ed25519` signature blob against a public key blob.
///
/// Used by the client side of the key exchange.
pub fn verify_signature(public_blob: &[u8], signature_blob: &[u8], data: &[u8]) -> CodecResult<()> {
    let mut key_reader = WireReader::new(public_blob);
    if key_reader.read_string("host key algorithm")? != SSH_ED25519.as_bytes() {
        return Err(CodecError::InvalidKeyMaterial("host key algorithm"));
    }
    let key: [u8; 32] = key_reader
        .read_string("host key")?
        .try_into()
        .map_err(|_| CodecError::InvalidKeyMaterial("host key"))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key).map_err(|_| CodecError::InvalidKeyMaterial("host key"))?;

    let mut sig_reader = WireReader::new(signature_blob);
    if sig_reader.read_string("signature algorithm")? != SSH_ED25519.as_bytes() {
        return Err(CodecError::InvalidKeyMaterial("signature algorithm"));
    }
    let signature: [u8; 64] = sig_reader
        .read_string("signature")?
        .try_into()
        .map_err(|_| CodecError::InvalidKeyMaterial("signature"))?;

    verifying_key
        .verify(data, &Signature::from_bytes(&signature))
        .map_err(|_| CodecError::KeyExchange("host key signature did not verify".to_string()))
}
