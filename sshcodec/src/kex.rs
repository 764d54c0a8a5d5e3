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

//! Algorithm negotiation and Curve25519 key exchange
//!
//! Implements `curve25519-sha256` (RFC 8731) with the exchange hash and key
//! derivation of RFC 4253 §7-8. Both roles are provided: the server role is
//! used by the listener, the client role by tests and tooling that need to
//! talk to it.

use crate::cipher::{CipherAlgorithm, DirectionKeys, MacAlgorithm};
use crate::consts::msg;
use crate::hostkey::{self, HostKey, SSH_ED25519};
use crate::ident::Identification;
use crate::wire::{WireReader, WireWrite};
use crate::{CodecError, CodecResult};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

/// Supported key exchange methods, in server preference order.
pub const KEX_ALGORITHMS: &[&str] = &["curve25519-sha256", "curve25519-sha256@libssh.org"];

/// The only supported compression method.
pub const COMPRESSION_NONE: &str = "none";

/// Contents of an `SSH_MSG_KEXINIT` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie
    pub cookie: [u8; 16],
    /// Key exchange methods
    pub kex_algorithms: Vec<String>,
    /// Host key algorithms
    pub server_host_key_algorithms: Vec<String>,
    /// Ciphers, client to server
    pub encryption_client_to_server: Vec<String>,
    /// Ciphers, server to client
    pub encryption_server_to_client: Vec<String>,
    /// MACs, client to server
    pub mac_client_to_server: Vec<String>,
    /// MACs, server to client
    pub mac_server_to_client: Vec<String>,
    /// Compression, client to server
    pub compression_client_to_server: Vec<String>,
    /// Compression, server to client
    pub compression_server_to_client: Vec<String>,
    /// Languages, client to server
    pub languages_client_to_server: Vec<String>,
    /// Languages, server to client
    pub languages_server_to_client: Vec<String>,
    /// Whether a guessed key exchange packet follows
    pub first_kex_packet_follows: bool,
    /// Reserved, must be zero
    pub reserved: u32,
}

impl KexInit {
    /// A KEXINIT listing every algorithm this crate implements, with a
    /// fresh random cookie.
    pub fn offer() -> Self {
        let mut cookie = [0u8; 16];
        OsRng.fill_bytes(&mut cookie);
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let ciphers = CipherAlgorithm::SUPPORTED
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>();
        let macs = MacAlgorithm::SUPPORTED
            .iter()
            .map(|m| m.name().to_string())
            .collect::<Vec<_>>();
        Self {
            cookie,
            kex_algorithms: names(KEX_ALGORITHMS),
            server_host_key_algorithms: names(&[SSH_ED25519]),
            encryption_client_to_server: ciphers.clone(),
            encryption_server_to_client: ciphers,
            mac_client_to_server: macs.clone(),
            mac_server_to_client: macs,
            compression_client_to_server: names(&[COMPRESSION_NONE]),
            compression_server_to_client: names(&[COMPRESSION_NONE]),
            languages_client_to_server: Vec::new(),
            languages_server_to_client: Vec::new(),
            first_kex_packet_follows: false,
            reserved: 0,
        }
    }

    /// Parse a KEXINIT payload, message number included.
    pub fn parse(payload: &[u8]) -> CodecResult<Self> {
        let mut r = WireReader::new(payload);
        let number = r.read_u8("message number")?;
        if number != msg::KEXINIT {
            return Err(CodecError::InvalidField {
                field: "message number",
                reason: format!("expected KEXINIT, got {number}"),
            });
        }
        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(r.read_bytes(16, "cookie")?);
        Ok(Self {
            cookie,
            kex_algorithms: r.read_name_list("kex_algorithms")?,
            server_host_key_algorithms: r.read_name_list("server_host_key_algorithms")?,
            encryption_client_to_server: r.read_name_list("encryption_algorithms_c2s")?,
            encryption_server_to_client: r.read_name_list("encryption_algorithms_s2c")?,
            mac_client_to_server: r.read_name_list("mac_algorithms_c2s")?,
            mac_server_to_client: r.read_name_list("mac_algorithms_s2c")?,
            compression_client_to_server: r.read_name_list("compression_algorithms_c2s")?,
            compression_server_to_client: r.read_name_list("compression_algorithms_s2c")?,
            languages_client_to_server: r.read_name_list("languages_c2s")?,
            languages_server_to_client: r.read_name_list("languages_s2c")?,
            first_kex_packet_follows: r.read_bool("first_kex_packet_follows")?,
            reserved: r.read_u32("reserved")?,
        })
    }

    /// Encode as a payload, message number included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.push(msg::KEXINIT);
        buf.extend_from_slice(&self.cookie);
        buf.put_name_list(&self.kex_algorithms);
        buf.put_name_list(&self.server_host_key_algorithms);
        buf.put_name_list(&self.encryption_client_to_server);
        buf.put_name_list(&self.encryption_server_to_client);
        buf.put_name_list(&self.mac_client_to_server);
        buf.put_name_list(&self.mac_server_to_client);
        buf.put_name_list(&self.compression_client_to_server);
        buf.put_name_list(&self.compression_server_to_client);
        buf.put_name_list(&self.languages_client_to_server);
        buf.put_name_list(&self.languages_server_to_client);
        buf.put_ssh_bool(self.first_kex_packet_follows);
        buf.extend_from_slice(&self.reserved.to_be_bytes());
        buf
    }
}

/// Algorithms agreed for one transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Negotiated {
    /// Key exchange method name
    pub kex: String,
    /// Host key algorithm name
    pub host_key: String,
    /// Cipher, client to server
    pub cipher_client_to_server: CipherAlgorithm,
    /// Cipher, server to client
    pub cipher_server_to_client: CipherAlgorithm,
    /// MAC, client to server
    pub mac_client_to_server: MacAlgorithm,
    /// MAC, server to client
    pub mac_server_to_client: MacAlgorithm,
}

fn choose(category: &'static str, client: &[String], server: &[String]) -> CodecResult<String> {
    client
        .iter()
        .find(|name| server.contains(name))
        .cloned()
        .ok_or_else(|| CodecError::NoCommonAlgorithm {
            category,
            offered: client.join(","),
        })
}

/// Pick, per category, the first client algorithm the server also lists.
pub fn negotiate(client: &KexInit, server: &KexInit) -> CodecResult<Negotiated> {
    let kex = choose("kex", &client.kex_algorithms, &server.kex_algorithms)?;
    let host_key = choose(
        "host key",
        &client.server_host_key_algorithms,
        &server.server_host_key_algorithms,
    )?;
    let cipher = |c: &[String], s: &[String]| -> CodecResult<CipherAlgorithm> {
        let name = choose("cipher", c, s)?;
        CipherAlgorithm::from_name(&name).ok_or(CodecError::NoCommonAlgorithm {
            category: "cipher",
            offered: name,
        })
    };
    let mac = |c: &[String], s: &[String]| -> CodecResult<MacAlgorithm> {
        let name = choose("mac", c, s)?;
        MacAlgorithm::from_name(&name).ok_or(CodecError::NoCommonAlgorithm {
            category: "mac",
            offered: name,
        })
    };
    choose(
        "compression",
        &client.compression_client_to_server,
        &server.compression_client_to_server,
    )?;
    choose(
        "compression",
        &client.compression_server_to_client,
        &server.compression_server_to_client,
    )?;
    Ok(Negotiated {
        kex,
        host_key,
        cipher_client_to_server: cipher(
            &client.encryption_client_to_server,
            &server.encryption_client_to_server,
        )?,
        cipher_server_to_client: cipher(
            &client.encryption_server_to_client,
            &server.encryption_server_to_client,
        )?,
        mac_client_to_server: mac(&client.mac_client_to_server, &server.mac_client_to_server)?,
        mac_server_to_client: mac(&client.mac_server_to_client, &server.mac_server_to_client)?,
    })
}

/// Whether the client's guessed key exchange packet must be ignored
/// (RFC 4253 §7.1).
pub fn guess_was_wrong(client: &KexInit, server: &KexInit) -> bool {
    client.first_kex_packet_follows
        && (client.kex_algorithms.first() != server.kex_algorithms.first()
            || client.server_host_key_algorithms.first()
                != server.server_host_key_algorithms.first())
}

/// An ephemeral X25519 key pair for a single exchange.
pub struct EphemeralKey {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKey {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The 32-byte public value sent to the peer.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Complete the Diffie-Hellman agreement with the peer's public value.
    ///
    /// Rejects malformed and low-order points.
    pub fn agree(self, peer_public: &[u8]) -> CodecResult<Zeroizing<[u8; 32]>> {
        let peer: [u8; 32] = peer_public.try_into().map_err(|_| {
            CodecError::KeyExchange(format!(
                "ephemeral public key must be 32 bytes, got {}",
                peer_public.len()
            ))
        })?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CodecError::KeyExchange(
                "peer sent a low-order public key".to_string(),
            ));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

/// Fixed inputs of one key exchange, shared by both roles.
#[derive(Debug)]
pub struct KexContext<'a> {
    /// Client identification (V_C)
    pub client_id: &'a Identification,
    /// Server identification (V_S)
    pub server_id: &'a Identification,
    /// Client KEXINIT payload (I_C)
    pub client_kexinit: &'a [u8],
    /// Server KEXINIT payload (I_S)
    pub server_kexinit: &'a [u8],
    /// Agreed algorithms
    pub negotiated: &'a Negotiated,
}

impl KexContext<'_> {
    /// Compute the exchange hash H.
    pub fn exchange_hash(
        &self,
        host_key_blob: &[u8],
        client_public: &[u8],
        server_public: &[u8],
        shared_secret: &[u8],
    ) -> [u8; 32] {
        let mut input = Vec::with_capacity(1024);
        input.put_ssh_string(self.client_id.as_bytes());
        input.put_ssh_string(self.server_id.as_bytes());
        input.put_ssh_string(self.client_kexinit);
        input.put_ssh_string(self.server_kexinit);
        input.put_ssh_string(host_key_blob);
        input.put_ssh_string(client_public);
        input.put_ssh_string(server_public);
        input.put_mpint(shared_secret);
        Sha256::digest(&input).into()
    }
}

/// Directional keys derived from one exchange.
#[derive(Debug)]
pub struct SessionKeys {
    /// Keys protecting client to server traffic
    pub client_to_server: DirectionKeys,
    /// Keys protecting server to client traffic
    pub server_to_client: DirectionKeys,
}

/// Result of the server side of a key exchange.
#[derive(Debug)]
pub struct ServerKexResult {
    /// Host key blob (K_S) for the reply
    pub host_key_blob: Vec<u8>,
    /// Server ephemeral public value (Q_S) for the reply
    pub server_public: Vec<u8>,
    /// Signature over H for the reply
    pub signature: Vec<u8>,
    /// Exchange hash H
    pub exchange_hash: [u8; 32],
    /// Keys to install after NEWKEYS
    pub keys: SessionKeys,
}

/// Run the server side of `curve25519-sha256`.
///
/// `session_id` is the exchange hash of the first key exchange on this
/// transport, or `None` during the first one.
pub fn server_exchange(
    ctx: &KexContext<'_>,
    host_key: &HostKey,
    client_public: &[u8],
    session_id: Option<&[u8]>,
) -> CodecResult<ServerKexResult> {
    let ephemeral = EphemeralKey::generate();
    let server_public = ephemeral.public_bytes();
    let shared = ephemeral.agree(client_public)?;
    let host_key_blob = host_key.public_blob();
    let exchange_hash =
        ctx.exchange_hash(&host_key_blob, client_public, &server_public, shared.as_slice());
    let session_id = session_id.unwrap_or(exchange_hash.as_slice());
    let keys = derive_keys(ctx.negotiated, shared.as_slice(), &exchange_hash, session_id);
    Ok(ServerKexResult {
        signature: host_key.sign(&exchange_hash),
        host_key_blob,
        server_public: server_public.to_vec(),
        exchange_hash,
        keys,
    })
}

/// Finish the client side of `curve25519-sha256` from the server's reply.
///
/// Verifies the host key signature and returns the exchange hash with the
/// derived keys.
pub fn client_exchange(
    ctx: &KexContext<'_>,
    ephemeral: EphemeralKey,
    host_key_blob: &[u8],
    server_public: &[u8],
    signature: &[u8],
    session_id: Option<&[u8]>,
) -> CodecResult<([u8; 32], SessionKeys)> {
    let client_public = ephemeral.public_bytes();
    let shared = ephemeral.agree(server_public)?;
    let exchange_hash =
        ctx.exchange_hash(host_key_blob, &client_public, server_public, shared.as_slice());
    hostkey::verify_signature(host_key_blob, signature, &exchange_hash)?;
    let session_id = session_id.unwrap_or(exchange_hash.as_slice());
    let keys = derive_keys(ctx.negotiated, shared.as_slice(), &exchange_hash, session_id);
    Ok((exchange_hash, keys))
}

/// Derive all six keys (RFC 4253 §7.2).
pub fn derive_keys(
    negotiated: &Negotiated,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
) -> SessionKeys {
    let derive = |letter: u8, len: usize| {
        derive_key(shared_secret, exchange_hash, letter, session_id, len)
    };
    let c2s_cipher = negotiated.cipher_client_to_server;
    let s2c_cipher = negotiated.cipher_server_to_client;
    let c2s_mac = negotiated.mac_client_to_server;
    let s2c_mac = negotiated.mac_server_to_client;
    SessionKeys {
        client_to_server: DirectionKeys {
            cipher: c2s_cipher,
            mac: c2s_mac,
            iv: derive(b'A', c2s_cipher.iv_len()),
            key: derive(b'C', c2s_cipher.key_len()),
            mac_key: derive(b'E', c2s_mac.key_len()),
        },
        server_to_client: DirectionKeys {
            cipher: s2c_cipher,
            mac: s2c_mac,
            iv: derive(b'B', s2c_cipher.iv_len()),
            key: derive(b'D', s2c_cipher.key_len()),
            mac_key: derive(b'F', s2c_mac.key_len()),
        },
    }
}

fn derive_key(
    shared_secret: &[u8],
    exchange_hash: &[u8],
    letter: u8,
    session_id: &[u8],
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut k = Zeroizing::new(Vec::with_capacity(4 + 1 + shared_secret.len()));
    k.put_mpint(shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(k.as_slice());
    hasher.update(exchange_hash);
    hasher.update([letter]);
    hasher.update(session_id);
    let mut out = Zeroizing::new(hasher.finalize().to_vec());

    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(k.as_slice());
        hasher.update(exchange_hash);
        hasher.update(out.as_slice());
        let block = hasher.finalize();
        out.extend_from_slice(&block);
    }
    out.truncate(len);
    out
}
