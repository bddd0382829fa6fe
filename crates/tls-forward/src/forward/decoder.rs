//! Response body decoding.
//!
//! The stream is always drained completely before the codec runs, so every
//! path (including codec failure) releases the connection.

use crate::engine::ResponseBody;
use crate::error::ForwardError;
use brotli::Decompressor;
use bytes::{Bytes, BytesMut};
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use futures::TryStreamExt;
use std::io::Read;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Codings this proxy decodes. Everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
    Brotli,
    Identity,
}

impl ContentCoding {
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return ContentCoding::Identity;
        };
        let value = value.trim();
        if value.eq_ignore_ascii_case("gzip") {
            ContentCoding::Gzip
        } else if value.eq_ignore_ascii_case("deflate") {
            ContentCoding::Deflate
        } else if value.eq_ignore_ascii_case("br") {
            ContentCoding::Brotli
        } else {
            ContentCoding::Identity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
            ContentCoding::Brotli => "br",
            ContentCoding::Identity => "identity",
        }
    }
}

async fn drain(body: ResponseBody) -> Result<Bytes, ForwardError> {
    let buf = body
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

fn read_all(mut reader: impl Read, coding: ContentCoding) -> Result<Bytes, ForwardError> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|source| ForwardError::Decode {
            encoding: coding.as_str().to_string(),
            source,
        })?;
    Ok(Bytes::from(out))
}

/// Decode an already buffered body.
///
/// An empty body is returned as is whatever the declared coding; bodies of
/// `HEAD` and `204` responses often still advertise one.
pub fn decode_bytes(raw: Bytes, coding: ContentCoding) -> Result<Bytes, ForwardError> {
    if raw.is_empty() {
        return Ok(raw);
    }
    match coding {
        // Every concatenated member is decoded; trailing bytes that are not a member fail
        ContentCoding::Gzip => read_all(MultiGzDecoder::new(&raw[..]), coding),
        ContentCoding::Deflate => read_all(DeflateDecoder::new(&raw[..]), coding),
        ContentCoding::Brotli => read_all(Decompressor::new(&raw[..], BROTLI_BUFFER_SIZE), coding),
        ContentCoding::Identity => Ok(raw),
    }
}

/// Drain `body` and decode it according to its `Content-Encoding` value.
pub async fn decode(body: ResponseBody, encoding: Option<&str>) -> Result<Bytes, ForwardError> {
    let coding = ContentCoding::from_header(encoding);
    let raw = drain(body).await?;
    decode_bytes(raw, coding)
}
