use crate::{
    bits::BitsExt,
    packet::{
        frame::Frame,
        header::{self, Header, LongHeader, ShortHeader, MAX_PACKET_NUMBER_LEN},
        types::{ConnectionId, FourBits, HeaderForm},
    },
    primitives::VarInt,
    result::{require, FerryError, FerryResult},
};

/// The only version this system speaks. Anything else on the wire is a
/// foreign/future protocol revision and must be rejected rather than
/// guessed at.
pub const SUPPORTED_VERSION: u32 = 1;

#[derive(PartialEq, Debug)]
pub enum Packet {
    Initial(InitialPacket),
    Short(ShortPacket),
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Initial(packet) => packet.encode(),
            Packet::Short(packet) => packet.encode(),
        }
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        let first_byte = *bytes
            .first()
            .ok_or_else(|| FerryError::MalformedPacket("empty datagram".into()))?;

        match (first_byte >> 7) & 1 == HeaderForm::long().to_inner() {
            true => InitialPacket::decode(bytes).map(Packet::Initial),
            false => ShortPacket::decode(bytes).map(Packet::Short),
        }
    }

    pub fn packet_number(&self) -> u64 {
        match self {
            Packet::Initial(packet) => packet.packet_number,
            Packet::Short(packet) => packet.packet_number,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        match self {
            Packet::Initial(packet) => &packet.frames,
            Packet::Short(_) => &[],
        }
    }
}

/// The only packet variant this system's sender and receiver ever build:
/// a numbered, frame-carrying long-header packet.
#[derive(PartialEq, Debug, Clone)]
pub struct InitialPacket {
    pub version: u32,
    pub dst_cid: ConnectionId,
    pub src_cid: ConnectionId,
    pub token: Vec<u8>,
    pub packet_number: u64,
    pub frames: Vec<Frame>,
}

impl InitialPacket {
    pub fn new(
        version: u32,
        dst_cid: ConnectionId,
        src_cid: ConnectionId,
        packet_number: u64,
        token: Vec<u8>,
        frames: Vec<Frame>,
    ) -> Self {
        Self {
            version,
            dst_cid,
            src_cid,
            token,
            packet_number,
            frames,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let pn_len = header::packet_number_byte_len(self.packet_number);
        let type_specific_bits = FourBits::from_num((pn_len - 1) as u8);

        let header = LongHeader::initial(
            self.version,
            self.dst_cid.clone(),
            self.src_cid.clone(),
            type_specific_bits,
        );

        let mut bytes = header.encode();

        let token_len = VarInt::new_u64(self.token.len() as u64).expect("token length fits");
        bytes.extend(token_len.encode());
        bytes.extend(self.token.iter());

        let mut frame_bytes = Vec::new();
        for frame in &self.frames {
            frame_bytes.extend(frame.encode());
        }

        let pn_bytes = header::encode_packet_number(self.packet_number, pn_len);

        let payload_len =
            VarInt::new_u64((pn_bytes.len() + frame_bytes.len()) as u64).expect("payload fits");
        bytes.extend(payload_len.encode());
        bytes.extend(pn_bytes);
        bytes.extend(frame_bytes);

        bytes
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        let header = LongHeader::decode(bytes)?;
        let long_header = match header {
            Header::Initial(long_header) => long_header,
            Header::Short(_) => unreachable!("LongHeader::decode never returns Header::Short"),
        };

        require(
            long_header.version_id() == SUPPORTED_VERSION,
            FerryError::MalformedPacket(format!(
                "unsupported version {}",
                long_header.version_id()
            )),
        )?;

        let token_len = VarInt::decode(bytes)?.usize();
        require(
            bytes.len() >= token_len,
            FerryError::MalformedPacket("initial packet truncated within token".into()),
        )?;
        let token = bytes.drain(0..token_len).collect();

        let payload_len = VarInt::decode(bytes)?.usize();
        let pn_len = long_header.packet_number_len();
        require(
            payload_len >= pn_len,
            FerryError::MalformedPacket("initial packet payload shorter than packet number".into()),
        )?;
        require(
            bytes.len() >= payload_len,
            FerryError::MalformedPacket("initial packet truncated within payload".into()),
        )?;

        let pn_bytes = bytes.drain(0..pn_len).collect::<Vec<u8>>();
        let packet_number = header::decode_packet_number(&pn_bytes);

        let mut frame_bytes: Vec<u8> = bytes.drain(0..(payload_len - pn_len)).collect();
        let mut frames = Vec::new();
        while !frame_bytes.is_empty() {
            match Frame::decode(&mut frame_bytes) {
                Ok(frame) => frames.push(frame),
                Err(FerryError::UnknownFrame(type_byte)) => {
                    tracing::warn!(type_byte, "skipping unknown frame type");
                    frame_bytes.remove(0);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            version: long_header.version_id(),
            dst_cid: long_header.dst_cid().clone(),
            src_cid: long_header.src_cid().clone(),
            token,
            packet_number,
            frames,
        })
    }
}

/// A symmetric short-packet encode/decode kept for codec completeness.
/// Nothing in this system's sender or receiver constructs one.
#[derive(PartialEq, Debug)]
pub struct ShortPacket {
    pub spin_bit: bool,
    pub key_phase: bool,
    pub dst_cid: Vec<u8>,
    pub packet_number: u64,
}

impl ShortPacket {
    pub fn new(spin_bit: bool, key_phase: bool, dst_cid: Vec<u8>, packet_number: u64) -> Self {
        Self {
            spin_bit,
            key_phase,
            dst_cid,
            packet_number,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        use crate::packet::types::SingleBit;

        let pn_len = header::packet_number_byte_len(self.packet_number).min(MAX_PACKET_NUMBER_LEN);
        let header = ShortHeader::new(
            SingleBit::from_num(self.spin_bit as u8),
            SingleBit::from_num(self.key_phase as u8),
            self.dst_cid.clone(),
        )
        .with_pn_len(pn_len);

        let mut bytes = header.encode();
        bytes.extend(header::encode_packet_number(self.packet_number, pn_len));
        bytes
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        let header = ShortHeader::decode(bytes)?;
        let pn_len = header.packet_number_len();

        require(
            bytes.len() >= pn_len,
            FerryError::MalformedPacket("short packet truncated within packet number".into()),
        )?;
        let pn_bytes: Vec<u8> = bytes.drain(0..pn_len).collect();
        let packet_number = header::decode_packet_number(&pn_bytes);

        Ok(Self {
            spin_bit: header.spin_bit(),
            key_phase: header.key_phase(),
            dst_cid: header.dst_cid().to_vec(),
            packet_number,
        })
    }
}
