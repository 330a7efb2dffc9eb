use crate::bits::{Bits, BitsExt};
use crate::bits_ext;

// unfortunately it's really annoying to implement a 160 bit integer
#[derive(PartialEq, Debug, Clone)]
pub struct ConnectionId {
    // this MUST NOT exceed 20 bytes
    // endpoints which receive a version 1 long header with a cid_len > 20 must drop the packet
    // to faciliate version negotiation packets, servers should be equipped to handle a cid_len > 20
    pub cid_len: u8,
    pub cid: Vec<u8>,
}

impl ConnectionId {
    pub fn new(cid_len: u8, cid: Vec<u8>) -> Self {
        Self { cid_len, cid }
    }

    /// A randomly generated connection id, mirroring the original's
    /// `random.randint` endpoint identifier but sized to fit the wire
    /// format's length-prefixed field.
    pub fn random(len: u8) -> Self {
        let cid = (0..len).map(|_| crate::primitives::rand::rand(256)).collect();
        Self::new(len, cid)
    }
}

bits_ext!(SingleBit, crate::bits::BitsExt, 1, u8);
bits_ext!(TwoBits, crate::bits::BitsExt, 2, u8);
bits_ext!(FourBits, crate::bits::BitsExt, 4, u8);
bits_ext!(LongPacketType, crate::bits::BitsExt, 2, u8);
bits_ext!(HeaderForm, crate::bits::BitsExt, 1, u8);

impl LongPacketType {
    pub fn initial() -> Self {
        Self::zero()
    }
}

impl HeaderForm {
    pub fn short() -> Self {
        Self::zero()
    }

    pub fn long() -> Self {
        Self::one()
    }
}
