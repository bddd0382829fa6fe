//! HTTP/2 frame layout (RFC 9113, section 4 and 6).

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
pub const HEADER_LEN: usize = 9;
/// Frame payloads never exceed this until the peer raises it.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;
pub const DEFAULT_WINDOW: u32 = 65_535;
pub const MAX_WINDOW: u32 = (1 << 31) - 1;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(value: u8) -> Self {
        match value {
            0x0 => Kind::Data,
            0x1 => Kind::Headers,
            0x2 => Kind::Priority,
            0x3 => Kind::RstStream,
            0x4 => Kind::Settings,
            0x5 => Kind::PushPromise,
            0x6 => Kind::Ping,
            0x7 => Kind::GoAway,
            0x8 => Kind::WindowUpdate,
            0x9 => Kind::Continuation,
            other => Kind::Unknown(other),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Kind::Data => 0x0,
            Kind::Headers => 0x1,
            Kind::Priority => 0x2,
            Kind::RstStream => 0x3,
            Kind::Settings => 0x4,
            Kind::PushPromise => 0x5,
            Kind::Ping => 0x6,
            Kind::GoAway => 0x7,
            Kind::WindowUpdate => 0x8,
            Kind::Continuation => 0x9,
            Kind::Unknown(other) => other,
        }
    }
}

/// A complete frame as read from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: Kind,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Append a frame header and payload to `out`.
pub fn write_frame(out: &mut BytesMut, kind: Kind, flags: u8, stream_id: u32, payload: &[u8]) {
    let len = payload.len() as u32;
    out.reserve(HEADER_LEN + payload.len());
    out.put_u8((len >> 16) as u8);
    out.put_u16(len as u16);
    out.put_u8(kind.as_u8());
    out.put_u8(flags);
    out.put_u32(stream_id & MAX_WINDOW);
    out.put_slice(payload);
}

/// Split one frame off the front of `buf` once it is fully buffered.
pub fn parse_frame(buf: &mut BytesMut) -> Option<Frame> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let len = (usize::from(buf[0]) << 16) | (usize::from(buf[1]) << 8) | usize::from(buf[2]);
    if buf.len() < HEADER_LEN + len {
        return None;
    }

    let mut header = buf.split_to(HEADER_LEN);
    header.advance(3);
    let kind = Kind::from_u8(header.get_u8());
    let flags = header.get_u8();
    let stream_id = header.get_u32() & MAX_WINDOW;
    let payload = buf.split_to(len).freeze();

    Some(Frame {
        kind,
        flags,
        stream_id,
        payload,
    })
}

/// Payload length announced by a buffered frame header.
pub fn peek_len(buf: &[u8]) -> Option<usize> {
    (buf.len() >= 3)
        .then(|| (usize::from(buf[0]) << 16) | (usize::from(buf[1]) << 8) | usize::from(buf[2]))
}

pub fn settings(out: &mut BytesMut, entries: &[(u16, u32)]) {
    let mut payload = BytesMut::with_capacity(entries.len() * 6);
    for (id, value) in entries {
        payload.put_u16(*id);
        payload.put_u32(*value);
    }
    write_frame(out, Kind::Settings, 0, 0, &payload);
}

pub fn settings_ack(out: &mut BytesMut) {
    write_frame(out, Kind::Settings, FLAG_ACK, 0, &[]);
}

/// `(identifier, value)` pairs of a SETTINGS payload.
pub fn parse_settings(payload: &[u8]) -> Option<Vec<(u16, u32)>> {
    if payload.len() % 6 != 0 {
        return None;
    }
    let entries = payload
        .chunks_exact(6)
        .map(|chunk| {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            (id, value)
        })
        .collect();
    Some(entries)
}

pub fn window_update(out: &mut BytesMut, stream_id: u32, increment: u32) {
    write_frame(
        out,
        Kind::WindowUpdate,
        0,
        stream_id,
        &(increment & MAX_WINDOW).to_be_bytes(),
    );
}

pub fn ping_ack(out: &mut BytesMut, opaque: &[u8]) {
    write_frame(out, Kind::Ping, FLAG_ACK, 0, opaque);
}

/// HEADERS followed by as many CONTINUATION frames as `max_frame_size` requires.
pub fn headers(out: &mut BytesMut, stream_id: u32, block: &[u8], end_stream: bool, max_frame_size: usize) {
    let mut chunks = block.chunks(max_frame_size.max(1)).peekable();
    let mut kind = Kind::Headers;
    let end_stream_flag = if end_stream { FLAG_END_STREAM } else { 0 };

    if chunks.peek().is_none() {
        write_frame(out, kind, FLAG_END_HEADERS | end_stream_flag, stream_id, &[]);
        return;
    }

    while let Some(chunk) = chunks.next() {
        let mut flags = if kind == Kind::Headers { end_stream_flag } else { 0 };
        if chunks.peek().is_none() {
            flags |= FLAG_END_HEADERS;
        }
        write_frame(out, kind, flags, stream_id, chunk);
        kind = Kind::Continuation;
    }
}

pub fn data(out: &mut BytesMut, stream_id: u32, chunk: &[u8], end_stream: bool) {
    let flags = if end_stream { FLAG_END_STREAM } else { 0 };
    write_frame(out, Kind::Data, flags, stream_id, chunk);
}

pub fn rst_stream(out: &mut BytesMut, stream_id: u32, code: u32) {
    write_frame(out, Kind::RstStream, 0, stream_id, &code.to_be_bytes());
}

/// Strip padding (and the priority block of HEADERS) from a payload.
pub fn unpad(frame: &Frame) -> Option<Bytes> {
    let mut payload = frame.payload.clone();

    let pad = if frame.has(FLAG_PADDED) {
        if payload.is_empty() {
            return None;
        }
        usize::from(payload.get_u8())
    } else {
        0
    };
    if frame.kind == Kind::Headers && frame.has(FLAG_PRIORITY) {
        if payload.len() < 5 {
            return None;
        }
        payload.advance(5);
    }
    if pad > payload.len() {
        return None;
    }
    payload.truncate(payload.len() - pad);
    Some(payload)
}
