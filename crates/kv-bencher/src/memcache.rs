//! Memcached text protocol client over TCP or UDP.
//!
//! Besides `set` and `get` this speaks the `ret` pattern-match extension:
//!
//! ```text
//! ret <key> <scan_count> <pattern_bytes>\r\n
//! <pattern>\r\n
//! ```
//!
//! which is answered like a `get`, with `END` alone meaning no match.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream},
    net::{lookup_host, TcpStream, UdpSocket},
    time::timeout,
};
use tracing::debug;

use crate::{
    address::{Address, Scheme},
    client::KvClient,
    error::RequestError,
};

/// Size of the frame header prepended to every memcached UDP datagram.
pub const UDP_HEADER_LEN: usize = 8;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Largest item memcached can be configured to store (`-I 1024m`).
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Stored,
    Value(Vec<u8>),
    Miss,
}

pub fn encode_set(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut request = Vec::with_capacity(key.len() + value.len() + 32);
    request.extend_from_slice(b"set ");
    request.extend_from_slice(key);
    request.extend_from_slice(format!(" 0 0 {}\r\n", value.len()).as_bytes());
    request.extend_from_slice(value);
    request.extend_from_slice(b"\r\n");
    request
}

pub fn encode_get(key: &[u8]) -> Vec<u8> {
    let mut request = Vec::with_capacity(key.len() + 6);
    request.extend_from_slice(b"get ");
    request.extend_from_slice(key);
    request.extend_from_slice(b"\r\n");
    request
}

pub fn encode_ret(key: &[u8], pattern: &[u8], scan_count: usize) -> Vec<u8> {
    let mut request = Vec::with_capacity(key.len() + pattern.len() + 32);
    request.extend_from_slice(b"ret ");
    request.extend_from_slice(key);
    request.extend_from_slice(format!(" {} {}\r\n", scan_count, pattern.len()).as_bytes());
    request.extend_from_slice(pattern);
    request.extend_from_slice(b"\r\n");
    request
}

/// Read one complete reply to a `set`, `get` or `ret`.
pub async fn read_response<R>(reader: &mut R) -> Result<Response, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    if line == "STORED" {
        return Ok(Response::Stored);
    }
    if line == "END" {
        return Ok(Response::Miss);
    }
    if let Some(header) = line.strip_prefix("VALUE ") {
        // <key> <flags> <bytes> [<cas unique>]
        let length = header
            .split(' ')
            .nth(2)
            .and_then(|l| l.parse::<usize>().ok())
            .filter(|length| *length <= MAX_VALUE_LENGTH)
            .ok_or_else(|| RequestError::UnexpectedResponse(line.clone()))?;
        // grows with the bytes actually received
        let mut data = Vec::new();
        (&mut *reader)
            .take(length as u64 + 2)
            .read_to_end(&mut data)
            .await?;
        if data.len() < length + 2 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        if !data.ends_with(b"\r\n") {
            return Err(RequestError::UnexpectedResponse(
                "value block not terminated".to_owned(),
            ));
        }
        data.truncate(length);

        let end = read_line(reader).await?;
        if end != "END" {
            return Err(RequestError::UnexpectedResponse(end));
        }
        return Ok(Response::Value(data));
    }
    if is_error_reply(&line) {
        return Err(RequestError::Server(line));
    }
    Err(RequestError::UnexpectedResponse(line))
}

fn is_error_reply(line: &str) -> bool {
    ["ERROR", "CLIENT_ERROR", "SERVER_ERROR", "NOT_STORED", "EXISTS", "NOT_FOUND"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

async fn read_line<R>(reader: &mut R) -> Result<String, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    match line.strip_suffix("\r\n") {
        Some(stripped) => Ok(stripped.to_owned()),
        None => Err(RequestError::UnexpectedResponse(format!(
            "unterminated line {:?}",
            line
        ))),
    }
}

/// Frame header of a memcached UDP datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub request_id: u16,
    pub sequence: u16,
    pub total: u16,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; UDP_HEADER_LEN] {
        let mut header = [0; UDP_HEADER_LEN];
        header[0..2].copy_from_slice(&self.request_id.to_be_bytes());
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..6].copy_from_slice(&self.total.to_be_bytes());
        header
    }

    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < UDP_HEADER_LEN {
            return None;
        }
        Some(Self {
            request_id: u16::from_be_bytes([datagram[0], datagram[1]]),
            sequence: u16::from_be_bytes([datagram[2], datagram[3]]),
            total: u16::from_be_bytes([datagram[4], datagram[5]]),
        })
    }
}

pub struct TcpTransport {
    address: String,
    connection: Option<BufStream<TcpStream>>,
}

impl TcpTransport {
    async fn connect(&mut self) -> Result<BufStream<TcpStream>, RequestError> {
        if let Some(connection) = self.connection.take() {
            return Ok(connection);
        }
        debug!(address = %self.address, "Connecting");
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(BufStream::new(stream))
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<Response, RequestError> {
        let mut connection = self.connect().await?;
        connection.write_all(request).await?;
        connection.flush().await?;
        match read_response(&mut connection).await {
            // error replies leave the stream in sync, anything else may not
            result @ (Ok(_) | Err(RequestError::Server(_))) => {
                self.connection = Some(connection);
                result
            }
            Err(error) => Err(error),
        }
    }
}

pub struct UdpTransport {
    address: String,
    socket: Option<UdpSocket>,
    request_id: u16,
    buffer: Vec<u8>,
}

impl UdpTransport {
    async fn bind(&mut self) -> Result<UdpSocket, RequestError> {
        if let Some(socket) = self.socket.take() {
            return Ok(socket);
        }
        let target = lookup_host(&self.address).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {}", self.address),
            )
        })?;
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        Ok(socket)
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<Response, RequestError> {
        let socket = self.bind().await?;
        let result = self.exchange_on(&socket, request).await;
        if !matches!(result, Err(RequestError::Io(_))) {
            self.socket = Some(socket);
        }
        result
    }

    async fn exchange_on(
        &mut self,
        socket: &UdpSocket,
        request: &[u8],
    ) -> Result<Response, RequestError> {
        let request_id = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);

        let header = FrameHeader {
            request_id,
            sequence: 0,
            total: 1,
        };
        let mut datagram = Vec::with_capacity(UDP_HEADER_LEN + request.len());
        datagram.extend_from_slice(&header.encode());
        datagram.extend_from_slice(request);
        socket.send(&datagram).await?;

        let mut parts: Vec<Option<Vec<u8>>> = Vec::new();
        loop {
            let n = socket.recv(&mut self.buffer).await?;
            let Some(header) = FrameHeader::decode(&self.buffer[..n]) else {
                continue;
            };
            // replies to earlier requests on this socket
            if header.request_id != request_id {
                continue;
            }
            if parts.is_empty() {
                parts.resize(usize::from(header.total.max(1)), None);
            }
            if let Some(part) = parts.get_mut(usize::from(header.sequence)) {
                *part = Some(self.buffer[UDP_HEADER_LEN..n].to_vec());
            }
            if parts.iter().all(Option::is_some) {
                break;
            }
        }

        let payload = parts.into_iter().flatten().flatten().collect::<Vec<_>>();
        read_response(&mut payload.as_slice()).await
    }
}

pub enum Transport {
    Tcp(TcpTransport),
    Udp(UdpTransport),
}

/// A memcached client owned by one worker.
pub struct MemcacheClient {
    transport: Transport,
    timeout: Duration,
}

impl MemcacheClient {
    pub fn new(address: &Address, timeout: Duration) -> Self {
        let authority = address.authority();
        let transport = match address.scheme {
            Scheme::Tcp => Transport::Tcp(TcpTransport {
                address: authority,
                connection: None,
            }),
            Scheme::Udp => Transport::Udp(UdpTransport {
                address: authority,
                socket: None,
                request_id: 0,
                buffer: vec![0; MAX_DATAGRAM],
            }),
        };
        Self { transport, timeout }
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<Response, RequestError> {
        let limit = self.timeout;
        let exchange = async {
            match &mut self.transport {
                Transport::Tcp(tcp) => tcp.exchange(request).await,
                Transport::Udp(udp) => udp.exchange(request).await,
            }
        };
        timeout(limit, exchange)
            .await
            .map_err(|_| RequestError::Timeout)?
    }
}

#[async_trait]
impl KvClient for MemcacheClient {
    async fn prepare(&mut self) -> Result<(), RequestError> {
        let limit = self.timeout;
        let prepare = async {
            match &mut self.transport {
                Transport::Tcp(tcp) => {
                    let connection = tcp.connect().await?;
                    tcp.connection = Some(connection);
                }
                Transport::Udp(udp) => {
                    let socket = udp.bind().await?;
                    udp.socket = Some(socket);
                }
            }
            Ok::<_, RequestError>(())
        };
        timeout(limit, prepare)
            .await
            .map_err(|_| RequestError::Timeout)?
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), RequestError> {
        match self.exchange(&encode_set(key, value)).await? {
            Response::Stored => Ok(()),
            other => Err(RequestError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RequestError> {
        match self.exchange(&encode_get(key)).await? {
            Response::Value(value) => Ok(Some(value)),
            Response::Miss => Ok(None),
            Response::Stored => Err(RequestError::UnexpectedResponse("STORED".to_owned())),
        }
    }

    async fn ret(
        &mut self,
        key: &[u8],
        pattern: &[u8],
        scan_count: usize,
    ) -> Result<Option<Vec<u8>>, RequestError> {
        match self.exchange(&encode_ret(key, pattern, scan_count)).await? {
            Response::Value(value) => Ok(Some(value)),
            Response::Miss => Ok(None),
            Response::Stored => Err(RequestError::UnexpectedResponse("STORED".to_owned())),
        }
    }
}
