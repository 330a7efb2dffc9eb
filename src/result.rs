use thiserror::Error;

pub type FerryResult<T> = Result<T, FerryError>;

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("malformed varint: {0}")]
    MalformedVarInt(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown frame type: {0:#04x}")]
    UnknownFrame(u8),

    #[error("unknown long packet type: {0}")]
    UnknownLongPacketType(u8),

    #[error("send failed: {0}")]
    SendFailed(std::io::Error),

    #[error("recv timed out")]
    RecvTimeout,

    #[error("io error: {0}")]
    Io(std::io::Error),
}

pub fn require(cond: bool, err: FerryError) -> FerryResult<()> {
    if !cond {
        return Err(err);
    }
    Ok(())
}
