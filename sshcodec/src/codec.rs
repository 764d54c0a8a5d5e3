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

use crate::cipher::{DirectionKeys, PacketProtection};
use crate::consts::{MAX_PACKET_LENGTH, MIN_PADDING, msg};
use crate::ident::{Identification, IdentificationReader};
use crate::{CodecError, CodecResult, Message};
use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Block size used before any cipher is active.
const CLEARTEXT_BLOCK: usize = 8;

/// A unit produced by [`SshCodec`]'s decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SshFrame {
    /// The peer's identification line, always the first frame.
    Identification(Identification),
    /// A binary packet payload.
    Packet(Packet),
}

/// A decrypted, authenticated packet payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Inbound sequence number of this packet
    pub sequence: u32,
    /// Payload, message number first
    pub payload: Bytes,
}

impl Packet {
    /// Message number of the payload.
    pub fn message_number(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Parse the payload into a [`Message`].
    pub fn message(&self) -> CodecResult<Message> {
        Message::parse(&self.payload)
    }
}

#[derive(Debug)]
enum Phase {
    Identification(IdentificationReader),
    Packets,
}

/// First cipher block of an encrypted packet, already decrypted, held while
/// the rest of the packet arrives.
#[derive(Debug)]
struct PendingPacket {
    head: BytesMut,
    packet_length: usize,
}

/// SSH-2 transport codec (RFC 4253 §6).
///
/// Decodes the peer identification line and then binary packets, and
/// encodes [`Message`]s as binary packets. Keys are supplied by the caller
/// after each key exchange: outbound protection takes effect on the next
/// encoded packet, inbound protection is staged and takes effect on the
/// packet after the peer's `SSH_MSG_NEWKEYS`.
#[derive(Debug)]
pub struct SshCodec {
    phase: Phase,
    inbound: Option<PacketProtection>,
    staged_inbound: Option<PacketProtection>,
    outbound: Option<PacketProtection>,
    inbound_sequence: u32,
    outbound_sequence: u32,
    pending: Option<PendingPacket>,
    max_packet_length: usize,
}

impl SshCodec {
    /// Create a codec expecting the peer's identification line first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that skips identification and starts at packets.
    pub fn packets_only() -> Self {
        Self {
            phase: Phase::Packets,
            ..Self::default()
        }
    }

    /// Override the maximum accepted packet length.
    pub fn with_max_packet_length(mut self, limit: usize) -> Self {
        self.max_packet_length = limit;
        self
    }

    /// Whether inbound packets are currently encrypted.
    pub fn is_inbound_protected(&self) -> bool {
        self.inbound.is_some()
    }

    /// Whether outbound packets are currently encrypted.
    pub fn is_outbound_protected(&self) -> bool {
        self.outbound.is_some()
    }

    /// Sequence number of the next inbound packet.
    pub fn inbound_sequence(&self) -> u32 {
        self.inbound_sequence
    }

    /// Sequence number of the next outbound packet.
    pub fn outbound_sequence(&self) -> u32 {
        self.outbound_sequence
    }

    /// Protect every packet encoded from now on with `keys`.
    ///
    /// Call immediately after encoding `SSH_MSG_NEWKEYS`.
    pub fn install_outbound(&mut self, keys: &DirectionKeys) -> CodecResult<()> {
        self.outbound = Some(PacketProtection::new(keys)?);
        debug!(cipher = keys.cipher.name(), mac = keys.mac.name(), "Outbound keys installed");
        Ok(())
    }

    /// Stage inbound keys to activate after the peer's `SSH_MSG_NEWKEYS`.
    pub fn stage_inbound(&mut self, keys: &DirectionKeys) -> CodecResult<()> {
        self.staged_inbound = Some(PacketProtection::new(keys)?);
        Ok(())
    }

    fn block_size_in(&self) -> usize {
        self.inbound
            .as_ref()
            .map_or(CLEARTEXT_BLOCK, PacketProtection::block_size)
    }

    fn block_size_out(&self) -> usize {
        self.outbound
            .as_ref()
            .map_or(CLEARTEXT_BLOCK, PacketProtection::block_size)
    }

    fn read_packet_length(&self, head: &[u8]) -> CodecResult<usize> {
        let packet_length = BigEndian::read_u32(head) as usize;
        if packet_length > self.max_packet_length {
            return Err(CodecError::PacketTooLarge {
                length: packet_length,
                limit: self.max_packet_length,
            });
        }
        if packet_length < 1 + MIN_PADDING {
            return Err(CodecError::MalformedPacket(format!(
                "packet length {packet_length} too small"
            )));
        }
        if self.inbound.is_some() && (packet_length + 4) % self.block_size_in() != 0 {
            return Err(CodecError::MalformedPacket(format!(
                "packet length {packet_length} not a multiple of the block size"
            )));
        }
        Ok(packet_length)
    }

    fn decode_packet(&mut self, src: &mut BytesMut) -> CodecResult<Option<Packet>> {
        let block = self.block_size_in();

        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => {
                if src.len() < block {
                    return Ok(None);
                }
                let mut head = src.split_to(block);
                if let Some(inbound) = self.inbound.as_mut() {
                    inbound.apply_keystream(&mut head);
                }
                let packet_length = self.read_packet_length(&head)?;
                PendingPacket {
                    head,
                    packet_length,
                }
            }
        };

        let mac_len = self.inbound.as_ref().map_or(0, PacketProtection::mac_len);
        // A valid packet is never shorter than one block.
        let remaining = 4 + pending.packet_length - pending.head.len();
        if src.len() < remaining + mac_len {
            src.reserve(remaining + mac_len - src.len());
            self.pending = Some(pending);
            return Ok(None);
        }

        let mut packet = pending.head;
        let mut rest = src.split_to(remaining);
        if let Some(inbound) = self.inbound.as_mut() {
            inbound.apply_keystream(&mut rest);
        }
        packet.unsplit(rest);

        let sequence = self.inbound_sequence;
        if let Some(inbound) = self.inbound.as_ref() {
            let tag = src.split_to(mac_len);
            inbound.verify(sequence, &packet, &tag)?;
        }
        self.inbound_sequence = self.inbound_sequence.wrapping_add(1);

        let padding = packet[4] as usize;
        if padding < MIN_PADDING || padding + 1 > pending.packet_length {
            return Err(CodecError::MalformedPacket(format!(
                "invalid padding length {padding}"
            )));
        }
        let payload_len = pending.packet_length - padding - 1;
        packet.advance(5);
        packet.truncate(payload_len);
        let payload = packet.freeze();

        if payload.first() == Some(&msg::NEWKEYS) {
            let staged = self.staged_inbound.take().ok_or_else(|| {
                CodecError::KeyExchange("NEWKEYS received before key exchange".to_string())
            })?;
            self.inbound = Some(staged);
            debug!("Inbound keys activated");
        }

        trace!(sequence, length = payload.len(), "Decoded packet");
        Ok(Some(Packet { sequence, payload }))
    }

    /// Frame `payload` as a binary packet into `dst`.
    pub fn encode_payload(&mut self, payload: &[u8], dst: &mut BytesMut) -> CodecResult<()> {
        let block = self.block_size_out();
        let mut padding = block - (5 + payload.len()) % block;
        if padding < MIN_PADDING {
            padding += block;
        }
        let packet_length = 1 + payload.len() + padding;

        let mut packet = BytesMut::with_capacity(4 + packet_length);
        packet.put_u32(packet_length as u32);
        packet.put_u8(padding as u8);
        packet.put_slice(payload);
        let mut pad = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut pad[..padding]);
        packet.put_slice(&pad[..padding]);

        let sequence = self.outbound_sequence;
        self.outbound_sequence = self.outbound_sequence.wrapping_add(1);

        match self.outbound.as_mut() {
            Some(outbound) => {
                let tag = outbound.sign(sequence, &packet)?;
                outbound.apply_keystream(&mut packet);
                dst.reserve(packet.len() + tag.len());
                dst.put_slice(&packet);
                dst.put_slice(&tag);
            }
            None => dst.put_slice(&packet),
        }
        trace!(sequence, length = payload.len(), "Encoded packet");
        Ok(())
    }
}

impl Default for SshCodec {
    fn default() -> Self {
        Self {
            phase: Phase::Identification(IdentificationReader::new()),
            inbound: None,
            staged_inbound: None,
            outbound: None,
            inbound_sequence: 0,
            outbound_sequence: 0,
            pending: None,
            max_packet_length: MAX_PACKET_LENGTH,
        }
    }
}

impl Decoder for SshCodec {
    type Item = SshFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SshFrame>, Self::Error> {
        match &mut self.phase {
            Phase::Identification(reader) => match reader.decode(src)? {
                Some(id) => {
                    self.phase = Phase::Packets;
                    Ok(Some(SshFrame::Identification(id)))
                }
                None => Ok(None),
            },
            Phase::Packets => Ok(self.decode_packet(src)?.map(SshFrame::Packet)),
        }
    }
}

impl Encoder<Message> for SshCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = BytesMut::with_capacity(64);
        item.encode(&mut payload);
        self.encode_payload(&payload, dst)
    }
}

impl Encoder<Bytes> for SshCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_payload(&item, dst)
    }
}
