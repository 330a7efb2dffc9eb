use crate::{
    bits::BitsExt,
    result::{require, FerryError, FerryResult},
};

use super::types::*;

/// The maximum number of bytes a packet number can occupy on the wire: only
/// two bits of the header are spared to record `packet_number_length - 1`.
pub const MAX_PACKET_NUMBER_LEN: usize = 4;

pub fn packet_number_byte_len(packet_number: u64) -> usize {
    let num_unacked = packet_number + 1;
    let min_bits = 64 - num_unacked.leading_zeros();
    (((min_bits + 7) / 8) as usize).clamp(1, MAX_PACKET_NUMBER_LEN)
}

pub fn encode_packet_number(packet_number: u64, len: usize) -> Vec<u8> {
    packet_number.to_be_bytes()[8 - len..].to_vec()
}

pub fn decode_packet_number(bytes: &[u8]) -> u64 {
    let mut padded = [0u8; 8];
    padded[8 - bytes.len()..].copy_from_slice(bytes);
    u64::from_be_bytes(padded)
}

#[derive(PartialEq, Debug)]
pub enum Header {
    Initial(LongHeader),
    Short(ShortHeader),
}

impl Header {
    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Header> {
        let first_byte = *bytes
            .first()
            .ok_or_else(|| FerryError::MalformedPacket("empty buffer at header boundary".into()))?;

        match (first_byte >> 7) & 1 == HeaderForm::long().to_inner() {
            true => LongHeader::decode(bytes),
            false => ShortHeader::decode(bytes).map(Header::Short),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Header::Initial(header) => header.encode(),
            Header::Short(header) => header.encode(),
        }
    }
}

/// Only the long-header variant this system actually sends: INITIAL.
/// Retry, 0-RTT, Handshake and Version Negotiation headers belong to the
/// handshake machinery this system does not implement.
#[derive(PartialEq, Debug)]
pub struct LongHeader {
    header_form: HeaderForm,
    fixed_bit: SingleBit,
    long_packet_type: LongPacketType,
    // low two bits: packet-number length minus one. High two bits reserved, always zero.
    type_specific_bits: FourBits,
    version_id: u32,
    dst_cid: ConnectionId,
    src_cid: ConnectionId,
}

impl LongHeader {
    pub fn header_len(&self) -> usize {
        1 + 4 + 1 + self.dst_cid.cid_len as usize + 1 + self.src_cid.cid_len as usize
    }

    pub fn initial(
        version_id: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        type_specific_bits: FourBits,
    ) -> Self {
        Self {
            header_form: HeaderForm::long(),
            fixed_bit: SingleBit::one(),
            long_packet_type: LongPacketType::initial(),
            type_specific_bits,
            version_id,
            dst_cid,
            src_cid,
        }
    }

    pub fn packet_number_len(&self) -> usize {
        (self.type_specific_bits.to_inner() & 0b0011) as usize + 1
    }

    pub fn dst_cid(&self) -> &ConnectionId {
        &self.dst_cid
    }

    pub fn src_cid(&self) -> &ConnectionId {
        &self.src_cid
    }

    pub fn version_id(&self) -> u32 {
        self.version_id
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Header> {
        require(
            !bytes.is_empty(),
            FerryError::MalformedPacket("empty buffer for long header".into()),
        )?;
        let first_byte = bytes.remove(0);

        let header_form = HeaderForm::from_num((first_byte >> 7) & 1);
        let fixed_bit = SingleBit::from_num((first_byte >> 6) & 1);
        let long_packet_type_bits = (first_byte >> 4) & 0b11;
        let type_specific_bits = FourBits::from_num(first_byte & 0b1111);

        if long_packet_type_bits != 0 {
            return Err(FerryError::UnknownLongPacketType(long_packet_type_bits));
        }
        let long_packet_type = LongPacketType::initial();

        require(
            bytes.len() >= 4,
            FerryError::MalformedPacket("long header truncated before version".into()),
        )?;
        let version_bytes: [u8; 4] = bytes.drain(0..4).collect::<Vec<u8>>().try_into().unwrap();
        let version_id = u32::from_be_bytes(version_bytes);

        let dst_cid_len = *bytes.first().ok_or_else(|| {
            FerryError::MalformedPacket("long header truncated before dst_cid length".into())
        })?;
        bytes.remove(0);
        require(
            bytes.len() >= dst_cid_len as usize,
            FerryError::MalformedPacket("long header truncated within dst_cid".into()),
        )?;
        let dst_cid_data = bytes.drain(0..dst_cid_len as usize).collect::<Vec<u8>>();
        let dst_cid = ConnectionId::new(dst_cid_len, dst_cid_data);

        let src_cid_len = *bytes.first().ok_or_else(|| {
            FerryError::MalformedPacket("long header truncated before src_cid length".into())
        })?;
        bytes.remove(0);
        require(
            bytes.len() >= src_cid_len as usize,
            FerryError::MalformedPacket("long header truncated within src_cid".into()),
        )?;
        let src_cid_data = bytes.drain(0..src_cid_len as usize).collect::<Vec<u8>>();
        let src_cid = ConnectionId::new(src_cid_len, src_cid_data);

        Ok(Header::Initial(Self {
            header_form,
            fixed_bit,
            long_packet_type,
            type_specific_bits,
            version_id,
            dst_cid,
            src_cid,
        }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_len());

        let mut first_byte = 0u8;
        first_byte |= self.header_form.to_inner() << 7;
        first_byte |= self.fixed_bit.to_inner() << 6;
        first_byte |= self.long_packet_type.to_inner() << 4;
        first_byte |= self.type_specific_bits.to_inner() & 0b1111;
        bytes.push(first_byte);

        bytes.extend(self.version_id.to_be_bytes());

        bytes.push(self.dst_cid.cid_len);
        bytes.extend(self.dst_cid.cid.iter());

        bytes.push(self.src_cid.cid_len);
        bytes.extend(self.src_cid.cid.iter());

        bytes
    }
}

/// Destination connection ID width for short packets. Real QUIC negotiates
/// this out of band during the handshake; since this system has no
/// handshake, a fixed width keeps the parse deterministic.
pub const SHORT_HEADER_CID_LEN: usize = 8;

/// A symmetric, round-trippable short-header parse kept for codec
/// completeness. No sender/receiver flow in this system constructs or
/// consumes one.
#[derive(PartialEq, Debug)]
pub struct ShortHeader {
    header_form: HeaderForm,
    fixed_bit: SingleBit,
    spin_bit: SingleBit,
    reserved_bits: TwoBits,
    key_phase: SingleBit,
    // packet-number length minus one
    pn_len_bits: TwoBits,
    dst_cid: Vec<u8>,
}

impl ShortHeader {
    pub fn new(spin_bit: SingleBit, key_phase: SingleBit, dst_cid: Vec<u8>) -> Self {
        Self {
            header_form: HeaderForm::short(),
            fixed_bit: SingleBit::one(),
            spin_bit,
            reserved_bits: TwoBits::zero(),
            key_phase,
            pn_len_bits: TwoBits::zero(),
            dst_cid,
        }
    }

    pub fn packet_number_len(&self) -> usize {
        (self.pn_len_bits.to_inner() & 0b11) as usize + 1
    }

    pub fn with_pn_len(self, pn_len: usize) -> Self {
        self.with_pn_len_bits((pn_len - 1) as u8)
    }

    fn with_pn_len_bits(mut self, pn_len_bits: u8) -> Self {
        self.pn_len_bits = TwoBits::from_num(pn_len_bits);
        self
    }

    pub fn spin_bit(&self) -> bool {
        self.spin_bit.to_inner() != 0
    }

    pub fn key_phase(&self) -> bool {
        self.key_phase.to_inner() != 0
    }

    pub fn dst_cid(&self) -> &[u8] {
        &self.dst_cid
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.dst_cid.len());

        let mut first_byte = 0u8;
        first_byte |= self.header_form.to_inner() << 7;
        first_byte |= self.fixed_bit.to_inner() << 6;
        first_byte |= self.spin_bit.to_inner() << 5;
        first_byte |= (self.reserved_bits.to_inner() & 0b11) << 3;
        first_byte |= self.key_phase.to_inner() << 2;
        first_byte |= self.pn_len_bits.to_inner() & 0b11;
        bytes.push(first_byte);

        bytes.extend(self.dst_cid.iter());
        bytes
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        require(
            !bytes.is_empty(),
            FerryError::MalformedPacket("empty buffer for short header".into()),
        )?;
        let first_byte = bytes.remove(0);

        let header_form = HeaderForm::from_num((first_byte >> 7) & 1);
        let fixed_bit = SingleBit::from_num((first_byte >> 6) & 1);
        let spin_bit = SingleBit::from_num((first_byte >> 5) & 1);
        let reserved_bits = TwoBits::from_num((first_byte >> 3) & 0b11);
        let key_phase = SingleBit::from_num((first_byte >> 2) & 1);
        let pn_len_bits = first_byte & 0b11;

        require(
            bytes.len() >= SHORT_HEADER_CID_LEN,
            FerryError::MalformedPacket("short header truncated within dst_cid".into()),
        )?;
        let dst_cid = bytes.drain(0..SHORT_HEADER_CID_LEN).collect();

        Ok(Self {
            header_form,
            fixed_bit,
            spin_bit,
            reserved_bits,
            key_phase,
            pn_len_bits: TwoBits::from_num(pn_len_bits),
            dst_cid,
        })
    }
}
