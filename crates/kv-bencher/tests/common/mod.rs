#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use kv_bencher::{
    memcache::{FrameHeader, UDP_HEADER_LEN},
    KvClient, RequestError,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream},
    net::{TcpListener, UdpSocket},
};

/// Records the key of every request, per worker.
#[derive(Clone, Default)]
pub struct Recorder {
    logs: Arc<Mutex<BTreeMap<usize, Vec<Vec<u8>>>>>,
    fail: bool,
}

impl Recorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn client(&self, worker: usize) -> MockClient {
        self.logs.lock().unwrap().insert(worker, Vec::new());
        MockClient {
            worker,
            recorder: self.clone(),
        }
    }

    /// Number of clients handed out.
    pub fn generated(&self) -> usize {
        self.logs.lock().unwrap().len()
    }

    pub fn keys_for(&self, worker: usize) -> Vec<Vec<u8>> {
        self.logs
            .lock()
            .unwrap()
            .get(&worker)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_requests(&self) -> usize {
        self.logs.lock().unwrap().values().map(Vec::len).sum()
    }

    fn record(&self, worker: usize, key: &[u8]) -> Result<(), RequestError> {
        self.logs
            .lock()
            .unwrap()
            .entry(worker)
            .or_default()
            .push(key.to_vec());
        if self.fail {
            Err(RequestError::Server("SERVER_ERROR unavailable".to_owned()))
        } else {
            Ok(())
        }
    }
}

pub struct MockClient {
    worker: usize,
    recorder: Recorder,
}

#[async_trait]
impl KvClient for MockClient {
    async fn set(&mut self, key: &[u8], _value: &[u8]) -> Result<(), RequestError> {
        tokio::task::yield_now().await;
        self.recorder.record(self.worker, key)
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RequestError> {
        tokio::task::yield_now().await;
        self.recorder.record(self.worker, key)?;
        Ok(Some(Vec::new()))
    }

    async fn ret(
        &mut self,
        key: &[u8],
        _pattern: &[u8],
        _scan_count: usize,
    ) -> Result<Option<Vec<u8>>, RequestError> {
        tokio::task::yield_now().await;
        self.recorder.record(self.worker, key)?;
        Ok(None)
    }
}

type Store = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

/// Serve one request of the memcached text protocol, `None` once the input is exhausted.
async fn handle<R>(reader: &mut R, store: &Store) -> Option<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let parts = line.trim_end().split(' ').collect::<Vec<_>>();
    match parts.as_slice() {
        ["set", key, _flags, _exptime, length] => {
            let data = read_block(reader, length).await?;
            store
                .lock()
                .unwrap()
                .insert(key.as_bytes().to_vec(), data);
            Some(b"STORED\r\n".to_vec())
        }
        ["get", key] => {
            let value = store.lock().unwrap().get(key.as_bytes()).cloned();
            Some(value_reply(key, value))
        }
        ["ret", key, _scan_count, length] => {
            let pattern = read_block(reader, length).await?;
            let value = store
                .lock()
                .unwrap()
                .get(key.as_bytes())
                .filter(|v| v.windows(pattern.len()).any(|w| w == pattern.as_slice()))
                .cloned();
            Some(value_reply(key, value))
        }
        _ => Some(b"ERROR\r\n".to_vec()),
    }
}

async fn read_block<R>(reader: &mut R, length: &str) -> Option<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let length = length.parse::<usize>().ok()?;
    let mut data = vec![0; length + 2];
    reader.read_exact(&mut data).await.ok()?;
    data.truncate(length);
    Some(data)
}

fn value_reply(key: &str, value: Option<Vec<u8>>) -> Vec<u8> {
    match value {
        Some(value) => {
            let mut reply = format!("VALUE {} 0 {}\r\n", key, value.len()).into_bytes();
            reply.extend_from_slice(&value);
            reply.extend_from_slice(b"\r\nEND\r\n");
            reply
        }
        None => b"END\r\n".to_vec(),
    }
}

/// In-memory memcached speaking TCP on an ephemeral port.
pub async fn tcp_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let store = Store::default();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut stream = BufStream::new(stream);
                while let Some(reply) = handle(&mut stream, &store).await {
                    if stream.write_all(&reply).await.is_err() || stream.flush().await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    address
}

/// In-memory memcached speaking UDP on an ephemeral port.
pub async fn udp_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let store = Store::default();
    tokio::spawn(async move {
        let mut buffer = vec![0; 64 * 1024];
        while let Ok((n, peer)) = socket.recv_from(&mut buffer).await {
            let Some(header) = FrameHeader::decode(&buffer[..n]) else {
                continue;
            };
            let mut request = &buffer[UDP_HEADER_LEN..n];
            let Some(reply) = handle(&mut request, &store).await else {
                continue;
            };
            let mut datagram = FrameHeader {
                request_id: header.request_id,
                sequence: 0,
                total: 1,
            }
            .encode()
            .to_vec();
            datagram.extend_from_slice(&reply);
            let _ = socket.send_to(&datagram, peer).await;
        }
    });
    address
}
