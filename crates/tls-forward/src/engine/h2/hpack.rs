//! HPACK header block coding (RFC 7541).
//!
//! The encoder never touches the dynamic table: every field goes out as a
//! literal without indexing, with the name taken from the static table when
//! it is there. Field order in the block is exactly the order given.

use super::huffman;
use std::collections::VecDeque;

/// RFC 7541 Appendix A.
const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Per-entry overhead counted against the table size.
const ENTRY_OVERHEAD: usize = 32;

pub const DEFAULT_TABLE_SIZE: usize = 4096;

/// Write `value` with an `prefix_bits` integer prefix, OR-ing `flags` into the first octet.
fn encode_int(out: &mut Vec<u8>, value: usize, prefix_bits: u8, flags: u8) {
    let max = (1usize << prefix_bits) - 1;
    if value < max {
        out.push(flags | value as u8);
        return;
    }
    out.push(flags | max as u8);
    let mut rest = value - max;
    while rest >= 128 {
        out.push((rest % 128) as u8 | 0x80);
        rest /= 128;
    }
    out.push(rest as u8);
}

fn encode_str(out: &mut Vec<u8>, value: &[u8]) {
    let huffman_len = huffman::encoded_len(value);
    if huffman_len < value.len() {
        encode_int(out, huffman_len, 7, 0x80);
        out.extend_from_slice(&huffman::encode(value));
    } else {
        encode_int(out, value.len(), 7, 0);
        out.extend_from_slice(value);
    }
}

/// Stateless encoder for request header blocks.
#[derive(Debug, Default)]
pub struct Encoder;

impl Encoder {
    /// Append one field as a literal without indexing.
    pub fn encode_field(&self, out: &mut Vec<u8>, name: &str, value: &[u8]) {
        match STATIC_TABLE.iter().position(|(n, _)| *n == name) {
            Some(index) => encode_int(out, index + 1, 4, 0x00),
            None => {
                out.push(0x00);
                encode_str(out, name.as_bytes());
            }
        }
        encode_str(out, value);
    }

    /// Encode `fields` in order into one header block.
    pub fn encode<'a, I>(&self, fields: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut out = Vec::new();
        for (name, value) in fields {
            self.encode_field(&mut out, name, value);
        }
        out
    }
}

/// Decoding failure; always a connection error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hpack: {0}")]
pub struct DecodeError(&'static str);

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn int(&mut self, prefix_bits: u8) -> Result<usize, DecodeError> {
        let max = (1usize << prefix_bits) - 1;
        let first = self.peek().ok_or(DecodeError("truncated integer"))?;
        self.pos += 1;

        let mut value = (first as usize) & max;
        if value < max {
            return Ok(value);
        }

        let mut shift = 0;
        loop {
            let byte = self.peek().ok_or(DecodeError("truncated integer"))?;
            self.pos += 1;
            if shift > 28 {
                return Err(DecodeError("integer overflow"));
            }
            value += ((byte & 0x7f) as usize) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let huffman_coded = self.peek().ok_or(DecodeError("truncated string"))? & 0x80 != 0;
        let len = self.int(7)?;
        let end = self.pos.checked_add(len).ok_or(DecodeError("string too long"))?;
        let raw = self.buf.get(self.pos..end).ok_or(DecodeError("truncated string"))?;
        self.pos = end;

        if huffman_coded {
            huffman::decode(raw).map_err(DecodeError)
        } else {
            Ok(raw.to_vec())
        }
    }
}

/// Response header block decoder with its dynamic table.
#[derive(Debug)]
pub struct Decoder {
    table: VecDeque<(Vec<u8>, Vec<u8>)>,
    size: usize,
    max_size: usize,
    /// Upper bound announced in our SETTINGS_HEADER_TABLE_SIZE
    limit: usize,
}

impl Decoder {
    pub fn new(limit: usize) -> Self {
        Self {
            table: VecDeque::new(),
            size: 0,
            max_size: limit,
            limit,
        }
    }

    fn get(&self, index: usize) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
        match index {
            0 => Err(DecodeError("index zero")),
            1..=61 => {
                let (name, value) = STATIC_TABLE[index - 1];
                Ok((name.as_bytes().to_vec(), value.as_bytes().to_vec()))
            }
            _ => self
                .table
                .get(index - 62)
                .cloned()
                .ok_or(DecodeError("index out of range")),
        }
    }

    fn evict_to(&mut self, target: usize) {
        while self.size > target {
            match self.table.pop_back() {
                Some((name, value)) => self.size -= name.len() + value.len() + ENTRY_OVERHEAD,
                None => break,
            }
        }
    }

    fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) {
        let entry_size = name.len() + value.len() + ENTRY_OVERHEAD;
        if entry_size > self.max_size {
            self.table.clear();
            self.size = 0;
            return;
        }
        self.evict_to(self.max_size - entry_size);
        self.size += entry_size;
        self.table.push_front((name, value));
    }

    /// Decode a complete header block into `(name, value)` pairs in wire order.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, DecodeError> {
        let mut cursor = Cursor { buf: block, pos: 0 };
        let mut fields = Vec::new();

        while let Some(first) = cursor.peek() {
            if first & 0x80 != 0 {
                let index = cursor.int(7)?;
                fields.push(self.get(index)?);
            } else if first & 0x40 != 0 {
                let field = self.literal(&mut cursor, 6)?;
                self.insert(field.0.clone(), field.1.clone());
                fields.push(field);
            } else if first & 0x20 != 0 {
                let size = cursor.int(5)?;
                if size > self.limit {
                    return Err(DecodeError("table size update above limit"));
                }
                self.max_size = size;
                self.evict_to(size);
            } else {
                fields.push(self.literal(&mut cursor, 4)?);
            }
        }

        Ok(fields)
    }

    fn literal(
        &self,
        cursor: &mut Cursor<'_>,
        prefix_bits: u8,
    ) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
        let index = cursor.int(prefix_bits)?;
        let name = if index == 0 {
            cursor.string()?
        } else {
            self.get(index)?.0
        };
        let value = cursor.string()?;
        Ok((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: &str) -> (Vec<u8>, Vec<u8>) {
        (name.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    #[test]
    fn test_integer_prefix() {
        // RFC 7541 C.1.2: 1337 with a 5 bit prefix
        let mut out = Vec::new();
        encode_int(&mut out, 1337, 5, 0);
        assert_eq!(out, vec![0x1f, 0x9a, 0x0a]);

        let mut cursor = Cursor { buf: &out, pos: 0 };
        assert_eq!(cursor.int(5).unwrap(), 1337);
    }

    #[test]
    fn test_rfc_response_sequence() {
        // RFC 7541 C.6.1 and C.6.2, Huffman coded with eviction at 256 octets.
        let first: Vec<u8> = vec![
            0x48, 0x82, 0x64, 0x02, 0x58, 0x85, 0xae, 0xc3, 0x77, 0x1a, 0x4b, 0x61, 0x96, 0xd0,
            0x7a, 0xbe, 0x94, 0x10, 0x54, 0xd4, 0x44, 0xa8, 0x20, 0x05, 0x95, 0x04, 0x0b, 0x81,
            0x66, 0xe0, 0x82, 0xa6, 0x2d, 0x1b, 0xff, 0x6e, 0x91, 0x9d, 0x29, 0xad, 0x17, 0x18,
            0x63, 0xc7, 0x8f, 0x0b, 0x97, 0xc8, 0xe9, 0xae, 0x82, 0xae, 0x43, 0xd3,
        ];
        let second: Vec<u8> = vec![0x48, 0x83, 0x64, 0x0e, 0xff, 0xc1, 0xc0, 0xbf];

        let mut decoder = Decoder::new(256);
        let fields = decoder.decode(&first).unwrap();
        assert_eq!(
            fields,
            vec![
                field(":status", "302"),
                field("cache-control", "private"),
                field("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
                field("location", "https://www.example.com"),
            ]
        );
        assert_eq!(decoder.size, 222);

        let fields = decoder.decode(&second).unwrap();
        assert_eq!(
            fields,
            vec![
                field(":status", "307"),
                field("cache-control", "private"),
                field("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
                field("location", "https://www.example.com"),
            ]
        );
        assert_eq!(decoder.size, 222);
    }

    #[test]
    fn test_encoder_keeps_given_order() {
        let encoder = Encoder;
        let block = encoder.encode([
            (":method", &b"GET"[..]),
            (":path", &b"/a"[..]),
            (":authority", &b"example.test"[..]),
            (":scheme", &b"https"[..]),
            ("x-custom", &b"1"[..]),
            ("user-agent", &b"Mozilla/5.0"[..]),
        ]);

        let mut decoder = Decoder::new(DEFAULT_TABLE_SIZE);
        let names: Vec<String> = decoder
            .decode(&block)
            .unwrap()
            .into_iter()
            .map(|(name, _)| String::from_utf8(name).unwrap())
            .collect();
        assert_eq!(
            names,
            vec![":method", ":path", ":authority", ":scheme", "x-custom", "user-agent"]
        );
        assert!(decoder.table.is_empty());
    }

    #[test]
    fn test_malformed_blocks_rejected() {
        let mut decoder = Decoder::new(DEFAULT_TABLE_SIZE);
        assert!(decoder.decode(&[0x80]).is_err());
        assert!(decoder.decode(&[0xbe]).is_err());
        assert!(decoder.decode(&[0x00, 0x05, b'a']).is_err());
        assert!(decoder.decode(&[0x3f, 0xe2, 0x1f]).is_err());
    }
}
