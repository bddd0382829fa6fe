//! Minimal HTTP/2 client for a single request per connection.
//!
//! Clients never outlive one forward, so a connection only ever carries
//! stream 1. Owning the framing means the profile's SETTINGS (values and
//! order), the connection window increment and the pseudo-header order all go
//! on the wire exactly as configured.

mod frame;
mod hpack;
mod huffman;

use self::frame::{Frame, Kind, FLAG_ACK, FLAG_END_HEADERS, FLAG_END_STREAM};
use self::hpack::{Decoder, Encoder, DEFAULT_TABLE_SIZE};
use super::order::{authority, path_and_query};
use super::pseudo::{PseudoHeader, PseudoOrder};
use super::EngineResponse;
use crate::error::ForwardError;
use crate::profile::ClientProfile;
use bytes::{Buf, Bytes, BytesMut};
use futures::{stream, StreamExt};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

const STREAM_ID: u32 = 1;

const NO_ERROR: u32 = 0x0;
const CANCEL: u32 = 0x8;

/// Largest legal SETTINGS_MAX_FRAME_SIZE.
const MAX_FRAME_SIZE_LIMIT: usize = 16_777_215;

/// Fields that only have meaning on an HTTP/1.1 connection.
fn is_connection_specific(name: &HeaderName, value: &HeaderValue) -> bool {
    match name.as_str() {
        "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding" | "upgrade"
        | "host" => true,
        "te" => value.as_bytes() != b"trailers",
        _ => false,
    }
}

/// Request as handed to the HTTP/2 connection.
pub(crate) struct H2Request<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    /// Already in emission order
    pub headers: &'a HeaderMap,
    pub body: Option<Bytes>,
    pub pseudo_order: PseudoOrder,
}

impl H2Request<'_> {
    fn pseudo_value(&self, pseudo: PseudoHeader) -> String {
        match pseudo {
            PseudoHeader::Method => self.method.as_str().to_string(),
            PseudoHeader::Authority => authority(self.url),
            PseudoHeader::Scheme => self.url.scheme().to_string(),
            PseudoHeader::Path => path_and_query(self.url),
        }
    }

    /// Pseudo-headers in the requested order, then the regular fields.
    fn header_block(&self) -> Vec<u8> {
        let pseudo: Vec<(&str, String)> = self
            .pseudo_order
            .iter()
            .map(|p| (p.as_str(), self.pseudo_value(p)))
            .collect();

        let regular = self
            .headers
            .iter()
            .filter(|(name, value)| !is_connection_specific(name, value))
            .map(|(name, value)| (name.as_str(), value.as_bytes()));

        Encoder.encode(
            pseudo
                .iter()
                .map(|(name, value)| (*name, value.as_bytes()))
                .chain(regular),
        )
    }
}

/// Header block being reassembled from HEADERS or PUSH_PROMISE plus CONTINUATION frames.
struct PendingBlock {
    stream_id: u32,
    end_stream: bool,
    promised: Option<u32>,
    block: BytesMut,
}

struct Connection<S> {
    io: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: Decoder,
    send_conn_window: i64,
    send_stream_window: i64,
    peer_initial_window: u32,
    peer_max_frame_size: usize,
    /// Largest payload we accept, as advertised in our SETTINGS
    local_max_frame_size: usize,
    pending: Option<PendingBlock>,
    head: Option<(StatusCode, HeaderMap)>,
    head_seen: bool,
    chunks: VecDeque<Bytes>,
    remote_closed: bool,
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn protocol_error(detail: impl std::fmt::Display) -> ForwardError {
    ForwardError::transport(format!("http2 protocol error: {detail}"))
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(io: S, profile: &ClientProfile) -> Self {
        let table_limit = profile
            .http2
            .header_table_size
            .map(|size| size as usize)
            .unwrap_or(DEFAULT_TABLE_SIZE);

        Self {
            io,
            read_buf: BytesMut::with_capacity(frame::DEFAULT_MAX_FRAME_SIZE),
            write_buf: BytesMut::new(),
            decoder: Decoder::new(table_limit),
            send_conn_window: i64::from(frame::DEFAULT_WINDOW),
            send_stream_window: i64::from(frame::DEFAULT_WINDOW),
            peer_initial_window: frame::DEFAULT_WINDOW,
            peer_max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            local_max_frame_size: profile
                .http2
                .max_frame_size
                .map(|size| size as usize)
                .unwrap_or_default()
                .max(frame::DEFAULT_MAX_FRAME_SIZE),
            pending: None,
            head: None,
            head_seen: false,
            chunks: VecDeque::new(),
            remote_closed: false,
        }
    }

    /// Preface, SETTINGS and the connection window increment.
    fn queue_preface(&mut self, profile: &ClientProfile) {
        self.write_buf.extend_from_slice(frame::PREFACE);
        frame::settings(&mut self.write_buf, &profile.http2.frame_entries());

        if let Some(window) = profile.http2.initial_connection_window_size {
            if window > frame::DEFAULT_WINDOW {
                frame::window_update(&mut self.write_buf, 0, window - frame::DEFAULT_WINDOW);
            }
        }
    }

    async fn flush(&mut self) -> Result<(), ForwardError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.io
            .write_all(&self.write_buf)
            .await
            .map_err(ForwardError::transport)?;
        self.io.flush().await.map_err(ForwardError::transport)?;
        self.write_buf.clear();
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, ForwardError> {
        loop {
            if let Some(frame) = frame::parse_frame(&mut self.read_buf) {
                return Ok(frame);
            }
            if frame::peek_len(&self.read_buf).is_some_and(|len| len > self.local_max_frame_size) {
                return Err(protocol_error("frame too large"));
            }
            let read = self
                .io
                .read_buf(&mut self.read_buf)
                .await
                .map_err(ForwardError::transport)?;
            if read == 0 {
                return Err(ForwardError::transport(
                    "connection closed before the response completed",
                ));
            }
        }
    }

    /// Read and handle one frame, then send whatever it produced.
    async fn step(&mut self) -> Result<(), ForwardError> {
        let frame = self.read_frame().await?;
        trace!(kind = ?frame.kind, flags = frame.flags, stream = frame.stream_id, len = frame.payload.len(), "h2 frame");
        self.handle(frame)?;
        self.flush().await
    }

    fn handle(&mut self, frame: Frame) -> Result<(), ForwardError> {
        if self.pending.is_some() && frame.kind != Kind::Continuation {
            return Err(protocol_error("expected CONTINUATION"));
        }

        match frame.kind {
            Kind::Settings => self.on_settings(&frame),
            Kind::Ping => {
                if !frame.has(FLAG_ACK) {
                    frame::ping_ack(&mut self.write_buf, &frame.payload);
                }
                Ok(())
            }
            Kind::WindowUpdate => self.on_window_update(&frame),
            Kind::Headers => {
                let block = frame::unpad(&frame).ok_or_else(|| protocol_error("bad HEADERS padding"))?;
                self.start_block(&frame, None, block)
            }
            Kind::PushPromise => {
                let mut block =
                    frame::unpad(&frame).ok_or_else(|| protocol_error("bad PUSH_PROMISE padding"))?;
                if block.len() < 4 {
                    return Err(protocol_error("short PUSH_PROMISE"));
                }
                let promised = block.get_u32() & frame::MAX_WINDOW;
                self.start_block(&frame, Some(promised), block)
            }
            Kind::Continuation => {
                let pending = self
                    .pending
                    .as_mut()
                    .filter(|pending| pending.stream_id == frame.stream_id)
                    .ok_or_else(|| protocol_error("unexpected CONTINUATION"))?;
                pending.block.extend_from_slice(&frame.payload);
                if frame.has(FLAG_END_HEADERS) {
                    self.finish_block()?;
                }
                Ok(())
            }
            Kind::Data => self.on_data(&frame),
            Kind::RstStream if frame.stream_id == STREAM_ID => {
                if self.remote_closed {
                    return Ok(());
                }
                let code = (frame.payload.len() == 4)
                    .then(|| be_u32(&frame.payload))
                    .unwrap_or(NO_ERROR);
                Err(ForwardError::transport(format!(
                    "stream reset by target (code {code:#x})"
                )))
            }
            Kind::GoAway => {
                let last_stream = (frame.payload.len() >= 8)
                    .then(|| be_u32(&frame.payload) & frame::MAX_WINDOW)
                    .unwrap_or(0);
                if last_stream < STREAM_ID && !self.remote_closed {
                    return Err(ForwardError::transport("target sent GOAWAY before the request"));
                }
                debug!(last_stream, "h2 GOAWAY received");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_settings(&mut self, frame: &Frame) -> Result<(), ForwardError> {
        if frame.has(FLAG_ACK) {
            return Ok(());
        }
        let entries =
            frame::parse_settings(&frame.payload).ok_or_else(|| protocol_error("bad SETTINGS length"))?;

        for (id, value) in entries {
            match id {
                crate::profile::SETTINGS_INITIAL_WINDOW_SIZE => {
                    if value > frame::MAX_WINDOW {
                        return Err(protocol_error("initial window too large"));
                    }
                    let delta = i64::from(value) - i64::from(self.peer_initial_window);
                    self.send_stream_window += delta;
                    self.peer_initial_window = value;
                }
                crate::profile::SETTINGS_MAX_FRAME_SIZE => {
                    let size = value as usize;
                    if !(frame::DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&size) {
                        return Err(protocol_error("max frame size out of range"));
                    }
                    self.peer_max_frame_size = size;
                }
                _ => {}
            }
        }

        frame::settings_ack(&mut self.write_buf);
        Ok(())
    }

    fn on_window_update(&mut self, frame: &Frame) -> Result<(), ForwardError> {
        if frame.payload.len() != 4 {
            return Err(protocol_error("bad WINDOW_UPDATE length"));
        }
        let increment = i64::from(be_u32(&frame.payload) & frame::MAX_WINDOW);

        let window = match frame.stream_id {
            0 => &mut self.send_conn_window,
            STREAM_ID => &mut self.send_stream_window,
            _ => return Ok(()),
        };
        *window += increment;
        if *window > i64::from(frame::MAX_WINDOW) {
            return Err(protocol_error("flow control window overflow"));
        }
        Ok(())
    }

    fn start_block(
        &mut self,
        frame: &Frame,
        promised: Option<u32>,
        fragment: Bytes,
    ) -> Result<(), ForwardError> {
        self.pending = Some(PendingBlock {
            stream_id: frame.stream_id,
            end_stream: frame.has(FLAG_END_STREAM),
            promised,
            block: BytesMut::from(&fragment[..]),
        });
        if frame.has(FLAG_END_HEADERS) {
            self.finish_block()?;
        }
        Ok(())
    }

    fn finish_block(&mut self) -> Result<(), ForwardError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let fields = self.decoder.decode(&pending.block).map_err(protocol_error)?;

        if let Some(promised) = pending.promised {
            frame::rst_stream(&mut self.write_buf, promised, CANCEL);
            return Ok(());
        }
        if pending.stream_id != STREAM_ID {
            return Ok(());
        }

        if !self.head_seen {
            let mut status = None;
            let mut headers = HeaderMap::new();
            for (name, value) in fields {
                if name.first() == Some(&b':') {
                    if name == b":status" {
                        status = StatusCode::from_bytes(&value).ok();
                    }
                    continue;
                }
                match (HeaderName::from_bytes(&name), HeaderValue::from_bytes(&value)) {
                    (Ok(name), Ok(value)) => {
                        headers.append(name, value);
                    }
                    _ => debug!("Dropping malformed response header"),
                }
            }

            let status = status.ok_or_else(|| protocol_error("response without :status"))?;
            if status.is_informational() {
                return Ok(());
            }
            self.head = Some((status, headers));
            self.head_seen = true;
        }

        if pending.end_stream {
            self.remote_closed = true;
        }
        Ok(())
    }

    fn on_data(&mut self, frame: &Frame) -> Result<(), ForwardError> {
        if frame.stream_id != STREAM_ID {
            return Ok(());
        }
        if !self.head_seen {
            return Err(protocol_error("DATA before response headers"));
        }
        let data = frame::unpad(frame).ok_or_else(|| protocol_error("bad DATA padding"))?;
        if !data.is_empty() {
            self.chunks.push_back(data);
        }
        if frame.has(FLAG_END_STREAM) {
            self.remote_closed = true;
        }

        let consumed = frame.payload.len() as u32;
        if consumed > 0 {
            frame::window_update(&mut self.write_buf, 0, consumed);
            if !self.remote_closed {
                frame::window_update(&mut self.write_buf, STREAM_ID, consumed);
            }
        }
        Ok(())
    }

    /// Send the request body within the peer's flow control windows.
    async fn send_body(&mut self, mut body: Bytes) -> Result<(), ForwardError> {
        while !body.is_empty() {
            if self.remote_closed {
                frame::rst_stream(&mut self.write_buf, STREAM_ID, NO_ERROR);
                return self.flush().await;
            }

            let window = self.send_conn_window.min(self.send_stream_window);
            if window <= 0 {
                self.step().await?;
                continue;
            }

            let len = body.len().min(window as usize).min(self.peer_max_frame_size);
            let chunk = body.split_to(len);
            frame::data(&mut self.write_buf, STREAM_ID, &chunk, body.is_empty());
            self.send_conn_window -= len as i64;
            self.send_stream_window -= len as i64;
            self.flush().await?;
        }
        Ok(())
    }
}

/// Issue `request` on a fresh HTTP/2 connection over `io`.
///
/// Returns once the response head has arrived; the body is read lazily from
/// the connection as the returned stream is polled.
pub(crate) async fn send<S>(
    io: S,
    profile: &ClientProfile,
    request: H2Request<'_>,
) -> Result<EngineResponse, ForwardError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut conn = Connection::new(io, profile);
    conn.queue_preface(profile);

    let block = request.header_block();
    let body = request.body.clone().filter(|body| !body.is_empty());
    frame::headers(
        &mut conn.write_buf,
        STREAM_ID,
        &block,
        body.is_none(),
        conn.peer_max_frame_size,
    );
    conn.flush().await?;

    debug!(
        pseudo_order = %request.pseudo_order.shorthand(),
        settings = ?profile.http2.frame_entries(),
        "h2 request sent"
    );

    if let Some(body) = body {
        conn.send_body(body).await?;
    }

    while !conn.head_seen {
        if conn.remote_closed {
            return Err(protocol_error("stream closed without a response"));
        }
        conn.step().await?;
    }

    let (status, headers) = conn
        .head
        .take()
        .ok_or_else(|| protocol_error("response head missing"))?;

    let body = stream::unfold(Some(conn), |state| async move {
        let mut conn = state?;
        loop {
            if let Some(chunk) = conn.chunks.pop_front() {
                return Some((Ok(chunk), Some(conn)));
            }
            if conn.remote_closed {
                return None;
            }
            if let Err(err) = conn.step().await {
                return Some((Err(err), None));
            }
        }
    })
    .boxed();

    Ok(EngineResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileTable;
    use futures::TryStreamExt;
    use tokio::io::{duplex, DuplexStream};

    fn request_parts(url: &str) -> (Method, Url, HeaderMap) {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("host", HeaderValue::from_static("ignored.test"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        (Method::POST, Url::parse(url).unwrap(), headers)
    }

    fn names(fields: &[(Vec<u8>, Vec<u8>)]) -> Vec<String> {
        fields
            .iter()
            .map(|(name, _)| String::from_utf8(name.clone()).unwrap())
            .collect()
    }

    /// Server side of the test connection: reads whole frames.
    struct Peer {
        io: DuplexStream,
        buf: BytesMut,
    }

    impl Peer {
        async fn expect_preface(&mut self) {
            let mut preface = vec![0u8; frame::PREFACE.len()];
            self.io.read_exact(&mut preface).await.unwrap();
            assert_eq!(preface, frame::PREFACE);
        }

        async fn frame(&mut self) -> Frame {
            loop {
                if let Some(frame) = frame::parse_frame(&mut self.buf) {
                    return frame;
                }
                let read = self.io.read_buf(&mut self.buf).await.unwrap();
                assert!(read > 0, "client closed");
            }
        }

        async fn send(&mut self, out: BytesMut) {
            self.io.write_all(&out).await.unwrap();
        }
    }

    #[test]
    fn test_header_block_follows_pseudo_order() {
        let (method, url, headers) = request_parts("https://example.test:8443/a/b?q=1");
        let names_list = [":method", ":path", ":authority", ":scheme"].map(String::from);
        let request = H2Request {
            method: &method,
            url: &url,
            headers: &headers,
            body: None,
            pseudo_order: PseudoOrder::parse(&names_list).unwrap(),
        };

        let fields = Decoder::new(DEFAULT_TABLE_SIZE)
            .decode(&request.header_block())
            .unwrap();
        assert_eq!(
            names(&fields),
            vec![":method", ":path", ":authority", ":scheme", "user-agent", "accept"]
        );
        assert_eq!(fields[1].1, b"/a/b?q=1");
        assert_eq!(fields[2].1, b"example.test:8443");
    }

    #[tokio::test]
    async fn test_request_and_response_over_duplex() {
        let (client_io, server_io) = duplex(1 << 20);
        let table = ProfileTable::builtin();
        let profile = table.get("chrome_120").unwrap();

        let server = tokio::spawn(async move {
            let mut peer = Peer {
                io: server_io,
                buf: BytesMut::new(),
            };
            peer.expect_preface().await;

            let settings = peer.frame().await;
            assert_eq!(settings.kind, Kind::Settings);
            assert_eq!(
                frame::parse_settings(&settings.payload).unwrap(),
                vec![(1, 65_536), (2, 0), (4, 6_291_456), (6, 262_144)]
            );

            let window = peer.frame().await;
            assert_eq!(window.kind, Kind::WindowUpdate);
            assert_eq!(&window.payload[..], &15_663_105u32.to_be_bytes());

            let headers = peer.frame().await;
            assert_eq!(headers.kind, Kind::Headers);
            assert!(headers.has(FLAG_END_HEADERS));
            assert!(!headers.has(FLAG_END_STREAM));
            let fields = Decoder::new(DEFAULT_TABLE_SIZE).decode(&headers.payload).unwrap();
            let seen = names(&fields);

            let data = peer.frame().await;
            assert_eq!(data.kind, Kind::Data);
            assert!(data.has(FLAG_END_STREAM));
            assert_eq!(&data.payload[..], b"{\"a\":1}");

            let mut out = BytesMut::new();
            frame::settings(&mut out, &[]);
            let block = Encoder.encode([
                (":status", &b"201"[..]),
                ("content-type", &b"text/plain"[..]),
                ("set-cookie", &b"a=1"[..]),
                ("set-cookie", &b"b=2"[..]),
            ]);
            frame::headers(&mut out, STREAM_ID, &block, false, 16_384);
            frame::data(&mut out, STREAM_ID, b"hello ", false);
            frame::data(&mut out, STREAM_ID, b"world", true);
            peer.send(out).await;

            // Drain acknowledgements until the client hangs up.
            while peer.io.read_buf(&mut peer.buf).await.unwrap() > 0 {}
            seen
        });

        let (method, url, headers) = request_parts("https://example.test/api");
        let names_list = [":method", ":authority", ":scheme", ":path"].map(String::from);
        let request = H2Request {
            method: &method,
            url: &url,
            headers: &headers,
            body: Some(Bytes::from_static(b"{\"a\":1}")),
            pseudo_order: PseudoOrder::parse(&names_list).unwrap(),
        };

        let response = send(client_io, &profile, request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers.get_all("set-cookie").iter().count(), 2);
        let chunks: Vec<Bytes> = response.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello world");

        let seen = server.await.unwrap();
        assert_eq!(
            seen,
            vec![":method", ":authority", ":scheme", ":path", "user-agent", "accept"]
        );
    }

    #[tokio::test]
    async fn test_reset_stream_is_transport_error() {
        let (client_io, server_io) = duplex(1 << 16);
        let table = ProfileTable::builtin();
        let profile = table.get("firefox_120").unwrap();

        tokio::spawn(async move {
            let mut peer = Peer {
                io: server_io,
                buf: BytesMut::new(),
            };
            peer.expect_preface().await;
            loop {
                let frame = peer.frame().await;
                if frame.kind == Kind::Headers {
                    break;
                }
            }
            let mut out = BytesMut::new();
            frame::rst_stream(&mut out, STREAM_ID, 0x2);
            peer.send(out).await;
            // Keep the pipe open until the client gives up.
            let _ = peer.io.read_buf(&mut peer.buf).await;
        });

        let (_, url, headers) = request_parts("https://example.test/");
        let request = H2Request {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            body: None,
            pseudo_order: PseudoOrder::default(),
        };
        let err = send(client_io, &profile, request).await.err().unwrap();
        assert!(matches!(err, ForwardError::Transport(_)));
        assert!(err.to_string().contains("reset"));
    }
}
