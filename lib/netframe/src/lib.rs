//! The TLV wire frame shared by every backend session (C1): a four-byte
//! big-endian `tag`, a four-byte big-endian `length`, then exactly `length`
//! payload bytes.

use std::convert::TryFrom;
use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use flux::error::ChatError;

/// Header is `tag(4B) | length(4B)`.
pub const HEADER_SIZE: usize = 8;

/// Hard cap on `length`, per spec.
pub const MAX_FRAME_LEN: u32 = 1 << 20;

/// Every tag a frame can carry. `GroupChatMsg` is parsed but never acted on
/// -- the wire tag stays reserved for compatibility even though the
/// fan-out it would imply is not implemented.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Tag {
    Debug = 0,
    Verify = 1,
    VerifyDone = 2,
    ChatMsg = 3,
    ChatMsgToCli = 4,
    GroupChatMsg = 5,
    Ping = 6,
}

impl TryFrom<u32> for Tag {
    type Error = ChatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Tag::Debug,
            1 => Tag::Verify,
            2 => Tag::VerifyDone,
            3 => Tag::ChatMsg,
            4 => Tag::ChatMsgToCli,
            5 => Tag::GroupChatMsg,
            6 => Tag::Ping,
            other => return Err(ChatError::ProtocolError(format!("unknown tag {}", other))),
        })
    }
}

impl From<Tag> for u32 {
    #[inline]
    fn from(tag: Tag) -> Self {
        tag as u32
    }
}

/// A decoded frame: tag plus owned payload bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub tag: Tag,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: Tag, payload: Vec<u8>) -> Frame {
        Frame { tag, payload }
    }
}

/// Encodes `(tag, payload)` into a single contiguous byte buffer ready to be
/// pushed onto a session's send queue. Panics if `payload` exceeds
/// `MAX_FRAME_LEN` -- callers construct outbound frames themselves and must
/// never build an oversized one.
pub fn encode_frame(tag: Tag, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_FRAME_LEN as usize,
        "outbound frame exceeds MAX_FRAME_LEN"
    );

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.write_u32::<BigEndian>(u32::from(tag)).unwrap();
    buf.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    buf.extend_from_slice(payload);
    buf
}

/// Blocking read of exactly one frame off `reader`. A short read before any
/// header byte arrives is a normal peer shutdown (`ConnectionClosed`); a
/// short read after the header has started, or mid-payload, is a protocol
/// violation (`ProtocolError`) since the peer promised `length` bytes and
/// didn't deliver them.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, ChatError> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_closed(reader, &mut header)?;

    let mut cursor = &header[..];
    let raw_tag = cursor.read_u32::<BigEndian>().unwrap();
    let length = cursor.read_u32::<BigEndian>().unwrap();

    if length > MAX_FRAME_LEN {
        return Err(ChatError::FrameTooLarge);
    }

    let tag = Tag::try_from(raw_tag)?;

    let mut payload = vec![0u8; length as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| map_mid_frame_error(e))?;

    Ok(Frame::new(tag, payload))
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ChatError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Err(ChatError::ConnectionClosed),
            Ok(0) => return Err(ChatError::ProtocolError("short header read".to_owned())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ChatError::ProtocolError(e.to_string())),
        }
    }
    Ok(())
}

fn map_mid_frame_error(e: io::Error) -> ChatError {
    ChatError::ProtocolError(format!("short payload read: {}", e))
}

/// Incremental decoder for the non-blocking reactor path: attempts to pull
/// one frame out of the front of an accumulating byte buffer without
/// consuming anything until a complete frame is present. Returns the frame
/// plus how many bytes to advance the buffer by, or `None` if more bytes are
/// needed.
pub fn try_decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, ChatError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut cursor = &buf[..HEADER_SIZE];
    let raw_tag = cursor.read_u32::<BigEndian>().unwrap();
    let length = cursor.read_u32::<BigEndian>().unwrap();

    if length > MAX_FRAME_LEN {
        return Err(ChatError::FrameTooLarge);
    }

    let total = HEADER_SIZE + length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let tag = Tag::try_from(raw_tag)?;
    let payload = buf[HEADER_SIZE..total].to_vec();

    Ok(Some((Frame::new(tag, payload), total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_blocking() {
        let encoded = encode_frame(Tag::ChatMsg, b"hello");
        let mut cursor = Cursor::new(encoded.clone());
        let frame = read_frame(&mut cursor).unwrap();
        assert_eq!(frame.tag, Tag::ChatMsg);
        assert_eq!(frame.payload, b"hello");
    }

    #[test]
    fn roundtrip_incremental() {
        let encoded = encode_frame(Tag::Ping, b"");
        let (frame, consumed) = try_decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.tag, Tag::Ping);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn incremental_waits_for_more_bytes() {
        let encoded = encode_frame(Tag::Debug, b"longer payload here");
        // Feed everything except the last byte.
        let partial = &encoded[..encoded.len() - 1];
        assert_eq!(try_decode(partial).unwrap(), None);
        assert_eq!(try_decode(&encoded).unwrap().unwrap().1, encoded.len());
    }

    #[test]
    fn incremental_handles_two_frames_back_to_back() {
        let mut buf = encode_frame(Tag::Ping, b"");
        buf.extend_from_slice(&encode_frame(Tag::Debug, b"x"));

        let (first, consumed) = try_decode(&buf).unwrap().unwrap();
        assert_eq!(first.tag, Tag::Ping);

        let (second, consumed2) = try_decode(&buf[consumed..]).unwrap().unwrap();
        assert_eq!(second.tag, Tag::Debug);
        assert_eq!(second.payload, b"x");
        assert_eq!(consumed + consumed2, buf.len());
    }

    #[test]
    fn oversized_length_is_frame_too_large() {
        let mut header = Vec::new();
        header.write_u32::<BigEndian>(Tag::Debug.into()).unwrap();
        header.write_u32::<BigEndian>(MAX_FRAME_LEN + 1).unwrap();

        assert_eq!(try_decode(&header).unwrap_err(), ChatError::FrameTooLarge);

        let mut cursor = Cursor::new(header);
        assert_eq!(read_frame(&mut cursor).unwrap_err(), ChatError::FrameTooLarge);
    }

    #[test]
    fn empty_stream_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_frame(&mut cursor).unwrap_err(), ChatError::ConnectionClosed);
    }

    #[test]
    fn short_header_is_protocol_error() {
        let mut cursor = Cursor::new(vec![0u8; 3]);
        assert_eq!(
            read_frame(&mut cursor).unwrap_err(),
            ChatError::ProtocolError("short header read".to_owned())
        );
    }

    #[test]
    fn unknown_tag_is_protocol_error() {
        let mut header = Vec::new();
        header.write_u32::<BigEndian>(99).unwrap();
        header.write_u32::<BigEndian>(0).unwrap();

        assert!(matches!(
            try_decode(&header).unwrap_err(),
            ChatError::ProtocolError(_)
        ));
    }

    #[test]
    fn chat_msg_payload_carries_big_endian_uid_prefix() {
        let mut payload = Vec::new();
        payload.write_u64::<BigEndian>(42).unwrap();
        payload.extend_from_slice(b"hi");

        let encoded = encode_frame(Tag::ChatMsg, &payload);
        let (frame, _) = try_decode(&encoded).unwrap().unwrap();

        let mut cursor = &frame.payload[..8];
        let uid = cursor.read_u64::<BigEndian>().unwrap();
        assert_eq!(uid, 42);
        assert_eq!(&frame.payload[8..], b"hi");
    }
}
