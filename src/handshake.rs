use crate::config::{ClientConfig, WebSocketConfig};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Error;
use crate::extensions::{merge_extensions, parse_extensions, response_extension_header, Extensions};
use crate::message::Message;
use crate::read::ReadStream;
use crate::request::{construct_http_request, HttpRequest};
use crate::split::{WSReader, WSWriter};
use crate::stream::SocketFlowStream;
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use crate::write::{Writer, WriterKind};
use futures::Stream;
use log::debug;
use pki_types::ServerName;
use rustls::{ClientConfig as RustlsClientConfig, RootCertStore};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use time::OffsetDateTime;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tokio_rustls::{TlsConnector, TlsStream};
use tokio_stream::wrappers::ReceiverStream;

const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";
const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";
const MAX_RESPONSE_HEADER_SIZE: usize = 16 * 1024;

/// A live WebSocket connection, returned by [`accept_async`]/[`connect_async`]
/// and their `_with_config` variants.
///
/// It can be driven directly as a [`Stream`] of incoming [`Message`]s while
/// also exposing methods to send data, or it can be [`split`](Self::split)
/// into an independent reader/writer pair so the two halves can be moved to
/// separate tasks.
pub struct WebSocketConnection {
    reader: WSReader,
    writer: WSWriter,
}

impl WebSocketConnection {
    pub fn split(self) -> (WSReader, WSWriter) {
        (self.reader, self.writer)
    }

    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), Error> {
        self.writer.send(data).await
    }

    pub async fn send_message(&mut self, message: Message) -> Result<(), Error> {
        self.writer.send_message(message).await
    }

    pub async fn send_as_binary(&mut self, data: Vec<u8>) -> Result<(), Error> {
        self.writer.send_as_binary(data).await
    }

    pub async fn send_as_text(&mut self, data: String) -> Result<(), Error> {
        self.writer.send_as_text(data).await
    }

    pub async fn send_ping(&mut self) -> Result<(), Error> {
        self.writer.send_ping().await
    }

    pub async fn send_large_data_fragmented(
        &mut self,
        data: Vec<u8>,
        fragment_size: usize,
    ) -> Result<(), Error> {
        self.writer
            .send_large_data_fragmented(data, fragment_size)
            .await
    }

    pub async fn close_connection(&mut self) -> Result<(), Error> {
        self.writer.close_connection().await
    }
}

impl Stream for WebSocketConnection {
    type Item = Result<Message, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.reader).poll_next(cx)
    }
}

/// Builds the codecs for one side of a connection. Each side's decoder
/// mirrors the *other* side's compression parameters, since that's whose
/// output it has to decompress; each side's encoder uses its own.
fn build_codecs(extensions: &Option<Extensions>, kind: &WriterKind) -> (Decoder, Encoder) {
    let ext = extensions.clone().unwrap_or_default();
    match kind {
        WriterKind::Server => {
            let decoder = Decoder::new(
                ext.client_no_context_takeover.unwrap_or(false),
                ext.client_max_window_bits,
            );
            let encoder = Encoder::new(
                ext.server_no_context_takeover.unwrap_or(false),
                ext.server_max_window_bits,
            );
            (decoder, encoder)
        }
        WriterKind::Client => {
            let decoder = Decoder::new(
                ext.server_no_context_takeover.unwrap_or(false),
                ext.server_max_window_bits,
            );
            let encoder = Encoder::new(
                ext.client_no_context_takeover.unwrap_or(false),
                ext.client_max_window_bits,
            );
            (decoder, encoder)
        }
    }
}

fn has_token(headers: &HashMap<String, String>, header: &str, token: &str) -> bool {
    headers
        .get(header)
        .map(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
        .unwrap_or(false)
}

/// Accepts an already-connected socket as a server, using default configuration.
pub async fn accept_async(stream: SocketFlowStream) -> Result<WebSocketConnection, Error> {
    accept_async_with_config(stream, None).await
}

/// Performs the server side of the opening handshake described in RFC 6455
/// section 4.2, then hands back a connection ready to exchange messages.
pub async fn accept_async_with_config(
    stream: SocketFlowStream,
    config: Option<WebSocketConfig>,
) -> Result<WebSocketConnection, Error> {
    let config = config.unwrap_or_default();
    let (read_half, write_half) = split(stream);
    let mut buf_reader = BufReader::new(read_half);
    let mut write_half = write_half;

    let mut request = HttpRequest::parse_http_request(&mut buf_reader).await?;

    if !has_token(&request.headers, "connection", "upgrade") {
        return Err(Error::NoConnectionHeaderPresent);
    }
    if !has_token(&request.headers, "upgrade", "websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }
    let key = request
        .get_header_value(SEC_WEBSOCKET_KEY)
        .ok_or(Error::NoSecWebsocketKey)?;

    let client_extensions = request
        .get_header_value(SEC_WEBSOCKET_EXTENSIONS)
        .and_then(parse_extensions);
    let negotiated = merge_extensions(config.extensions.clone(), client_extensions);

    let accept_value = generate_websocket_accept_value(key);
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n",
        accept_value
    );
    if let Some(ref extensions) = negotiated {
        if let Some(header) = response_extension_header(extensions) {
            response.push_str(&header);
        }
    }
    response.push_str("\r\n");
    write_half.write_all(response.as_bytes()).await?;

    debug!(
        "completed server handshake at {}",
        OffsetDateTime::now_utc()
    );

    let negotiated_config = WebSocketConfig {
        extensions: negotiated,
        ..config
    };
    let (decoder, encoder) = build_codecs(&negotiated_config.extensions, &WriterKind::Server);
    let writer = Arc::new(Mutex::new(Writer::new(write_half, WriterKind::Server)));
    let (read_tx, read_rx) = mpsc::channel(1000);

    let mut read_stream = ReadStream::new(
        buf_reader,
        read_tx,
        writer.clone(),
        negotiated_config.clone(),
        decoder,
        WriterKind::Server,
    );
    tokio::spawn(async move {
        if let Err(err) = read_stream.poll_messages().await {
            debug!("server read loop terminated: {err}");
        }
    });

    Ok(WebSocketConnection {
        reader: WSReader::new(ReceiverStream::new(read_rx)),
        writer: WSWriter::new(writer, negotiated_config, encoder),
    })
}

/// Connects to a `ws://`/`wss://` URL using default configuration.
pub async fn connect_async(ws_url: &str) -> Result<WebSocketConnection, Error> {
    connect_async_with_config(ws_url, None).await
}

/// Dials `ws_url`, performs the client side of the RFC 6455 handshake, and
/// returns a connection ready to exchange messages.
pub async fn connect_async_with_config(
    ws_url: &str,
    config: Option<ClientConfig>,
) -> Result<WebSocketConnection, Error> {
    let config = config.unwrap_or_default();
    let key = generate_websocket_key();
    let (request, host_with_port, host, use_tls) = construct_http_request(
        ws_url,
        &key,
        config.web_socket_config.extensions.clone(),
    )?;

    let tcp_stream = TcpStream::connect(&host_with_port).await?;

    let stream = if use_tls {
        let connector = build_tls_connector(config.ca_file.as_deref())?;
        let server_name = ServerName::try_from(host)?;
        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        SocketFlowStream::Secure(TlsStream::from(tls_stream))
    } else {
        SocketFlowStream::Plain(tcp_stream)
    };

    let (read_half, write_half) = split(stream);
    let mut buf_reader = BufReader::new(read_half);
    let mut write_half = write_half;

    write_half.write_all(request.as_bytes()).await?;

    let (status, headers) = read_http_response(&mut buf_reader).await?;
    if status != 101 {
        return Err(Error::HandshakeFailed(status));
    }

    let accept = headers
        .get(SEC_WEBSOCKET_ACCEPT)
        .ok_or(Error::InvalidAcceptKey)?;
    if *accept != generate_websocket_accept_value(key) {
        return Err(Error::InvalidAcceptKey);
    }

    let negotiated = headers
        .get(SEC_WEBSOCKET_EXTENSIONS)
        .cloned()
        .and_then(parse_extensions);

    debug!(
        "completed client handshake at {}",
        OffsetDateTime::now_utc()
    );

    let negotiated_config = WebSocketConfig {
        extensions: negotiated,
        ..config.web_socket_config
    };
    let (decoder, encoder) = build_codecs(&negotiated_config.extensions, &WriterKind::Client);
    let writer = Arc::new(Mutex::new(Writer::new(write_half, WriterKind::Client)));
    let (read_tx, read_rx) = mpsc::channel(1000);

    let mut read_stream = ReadStream::new(
        buf_reader,
        read_tx,
        writer.clone(),
        negotiated_config.clone(),
        decoder,
        WriterKind::Client,
    );
    tokio::spawn(async move {
        if let Err(err) = read_stream.poll_messages().await {
            debug!("client read loop terminated: {err}");
        }
    });

    Ok(WebSocketConnection {
        reader: WSReader::new(ReceiverStream::new(read_rx)),
        writer: WSWriter::new(writer, negotiated_config, encoder),
    })
}

/// Reads and parses the server's HTTP response line + headers using
/// `httparse`, stopping at the blank line that ends the header block.
async fn read_http_response<T: AsyncReadExt + Unpin>(
    reader: &mut BufReader<T>,
) -> Result<(u16, HashMap<String, String>), Error> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        if let Some(end) = find_header_end(&buffer) {
            let mut header_slots = [httparse::EMPTY_HEADER; 32];
            let mut response = httparse::Response::new(&mut header_slots);
            response.parse(&buffer[..end])?;

            let status = response.code.ok_or(Error::HttpParseFailed)?;
            let mut headers = HashMap::new();
            for header in response.headers.iter() {
                headers.insert(
                    header.name.to_lowercase(),
                    String::from_utf8_lossy(header.value).into_owned(),
                );
            }
            return Ok((status, headers));
        }

        if buffer.len() > MAX_RESPONSE_HEADER_SIZE {
            return Err(Error::HttpParseFailed);
        }

        let n = timeout(Duration::from_secs(5), reader.read(&mut chunk)).await??;
        if n == 0 {
            return Err(Error::IncompleteHTTPRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn build_tls_connector(ca_file: Option<&str>) -> Result<TlsConnector, Error> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_file {
        let file = File::open(path)?;
        let mut reader = StdBufReader::new(file);
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert?;
            root_store.add(cert).map_err(|_| Error::InvalidOptions)?;
        }
    }

    let tls_config = RustlsClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(tls_config)))
}
