use crate::{
    primitives::VarInt,
    result::{FerryError, FerryResult},
};

const STREAM_TYPE_BASE: u8 = 0b0000_1000;
const STREAM_TYPE_OFF: u8 = 0b0000_0100;
const STREAM_TYPE_LEN: u8 = 0b0000_0010;
const STREAM_TYPE_FIN: u8 = 0b0000_0001;
const ACK_TYPE: u8 = 0x02;

/// A STREAM or ACK frame. Everything else this system's packets might
/// plausibly carry (padding, crypto, connection management) belongs to the
/// handshake machinery this system does not implement.
#[derive(PartialEq, Debug, Clone)]
pub enum Frame {
    Stream(StreamFrame),
    Ack(AckFrame),
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Stream(frame) => frame.encode(),
            Frame::Ack(frame) => frame.encode(),
        }
    }

    /// Decodes exactly one frame from the front of `bytes`, consuming it.
    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        let type_byte = *bytes
            .first()
            .ok_or_else(|| FerryError::MalformedPacket("empty buffer at frame boundary".into()))?;

        if type_byte == ACK_TYPE {
            return Ok(Frame::Ack(AckFrame::decode(bytes)?));
        }

        if type_byte >> 3 == 1 {
            return Ok(Frame::Stream(StreamFrame::decode(bytes)?));
        }

        Err(FerryError::UnknownFrame(type_byte))
    }
}

/// Carries application payload, identified by a stream id and an optional
/// byte offset within that stream.
#[derive(PartialEq, Debug, Clone)]
pub struct StreamFrame {
    pub stream_id: u64,
    pub offset: Option<u64>,
    pub include_length: bool,
    pub finish: bool,
    pub data: Vec<u8>,
}

impl StreamFrame {
    pub fn new(
        stream_id: u64,
        include_length: bool,
        offset: Option<u64>,
        finish: bool,
        data: Vec<u8>,
    ) -> Self {
        Self {
            stream_id,
            offset,
            include_length,
            finish,
            data,
        }
    }

    fn type_byte(&self) -> u8 {
        let mut type_byte = STREAM_TYPE_BASE;
        if self.offset.is_some() {
            type_byte |= STREAM_TYPE_OFF;
        }
        if self.include_length {
            type_byte |= STREAM_TYPE_LEN;
        }
        if self.finish {
            type_byte |= STREAM_TYPE_FIN;
        }
        type_byte
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = vec![self.type_byte()];

        buffer.extend(VarInt::new_u64(self.stream_id).expect("stream id fits in varint").encode());

        if let Some(offset) = self.offset {
            buffer.extend(
                VarInt::new_u64(offset)
                    .expect("offset fits in varint")
                    .encode(),
            );
        }

        if self.include_length {
            buffer.extend(
                VarInt::new_u64(self.data.len() as u64)
                    .expect("data length fits in varint")
                    .encode(),
            );
        }

        buffer.extend(self.data.iter());

        buffer
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        let type_byte = bytes.remove(0);

        let finish = type_byte & STREAM_TYPE_FIN != 0;
        let include_length = type_byte & STREAM_TYPE_LEN != 0;
        let offset_present = type_byte & STREAM_TYPE_OFF != 0;

        let stream_id = VarInt::decode(bytes)?.to_inner();

        let offset = if offset_present {
            Some(VarInt::decode(bytes)?.to_inner())
        } else {
            None
        };

        let data = if include_length {
            let length = VarInt::decode(bytes)?.usize();
            if bytes.len() < length {
                return Err(FerryError::MalformedPacket(
                    "stream frame data shorter than declared length".into(),
                ));
            }
            bytes.drain(0..length).collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            stream_id,
            offset,
            include_length,
            finish,
            data,
        })
    }
}

/// Acknowledges one contiguous window of packet numbers,
/// `[largest_acknowledged - first_ack_range, largest_acknowledged]`.
///
/// `ack_range_count` is always encoded as 0 — this implementation never
/// emits additional gap/range pairs. Incoming frames with a nonzero count
/// are accepted and read as a single range.
#[derive(PartialEq, Debug, Clone)]
pub struct AckFrame {
    pub largest_acknowledged: u64,
    pub ack_delay: u64,
    pub ack_range_count: u64,
    pub first_ack_range: u64,
}

impl AckFrame {
    pub fn new(largest_acknowledged: u64, first_ack_range: u64) -> Self {
        Self {
            largest_acknowledged,
            ack_delay: 0,
            ack_range_count: 0,
            first_ack_range,
        }
    }

    pub fn smallest_acknowledged(&self) -> u64 {
        self.largest_acknowledged.saturating_sub(self.first_ack_range)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = vec![ACK_TYPE];
        buffer.extend(
            VarInt::new_u64(self.largest_acknowledged)
                .expect("largest_acknowledged fits in varint")
                .encode(),
        );
        buffer.extend(
            VarInt::new_u64(self.ack_delay)
                .expect("ack_delay fits in varint")
                .encode(),
        );
        buffer.extend(
            VarInt::new_u64(self.ack_range_count)
                .expect("ack_range_count fits in varint")
                .encode(),
        );
        buffer.extend(
            VarInt::new_u64(self.first_ack_range)
                .expect("first_ack_range fits in varint")
                .encode(),
        );
        buffer
    }

    pub fn decode(bytes: &mut Vec<u8>) -> FerryResult<Self> {
        bytes.remove(0); // type byte, already matched by the caller

        let largest_acknowledged = VarInt::decode(bytes)?.to_inner();
        let ack_delay = VarInt::decode(bytes)?.to_inner();
        let ack_range_count = VarInt::decode(bytes)?.to_inner();
        let first_ack_range = VarInt::decode(bytes)?.to_inner();

        Ok(Self {
            largest_acknowledged,
            ack_delay,
            ack_range_count,
            first_ack_range,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stream_frame_round_trip() {
        let frame = StreamFrame::new(7, true, Some(1000), true, b"hello world".to_vec());
        let mut bytes = frame.encode();
        let decoded = StreamFrame::decode(&mut bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_stream_frame_no_offset_no_length() {
        let frame = StreamFrame::new(3, false, None, false, Vec::new());
        let bytes = frame.encode();
        assert_eq!(bytes, vec![0b0000_1000, 0x03]);
    }

    #[test]
    fn test_ack_frame_round_trip() {
        let frame = AckFrame::new(42, 10);
        let mut bytes = frame.encode();
        let decoded = AckFrame::decode(&mut bytes).unwrap();
        assert_eq!(frame, decoded);
        assert_eq!(decoded.smallest_acknowledged(), 32);
    }

    #[test]
    fn test_frame_dispatch() {
        let stream = Frame::Stream(StreamFrame::new(1, true, None, false, vec![1, 2, 3]));
        let mut stream_bytes = stream.encode();
        assert_eq!(Frame::decode(&mut stream_bytes).unwrap(), stream);

        let ack = Frame::Ack(AckFrame::new(5, 2));
        let mut ack_bytes = ack.encode();
        assert_eq!(Frame::decode(&mut ack_bytes).unwrap(), ack);
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut bytes = vec![0xff];
        assert!(matches!(
            Frame::decode(&mut bytes),
            Err(FerryError::UnknownFrame(0xff))
        ));
    }
}
