use async_trait::async_trait;

use crate::error::RequestError;

/// The operations a worker issues against the key-value service.
///
/// Each worker owns its client exclusively, so implementations need not be `Sync`.
#[async_trait]
pub trait KvClient: Send + 'static {
    /// Establish any connection state ahead of the measured window.
    async fn prepare(&mut self) -> Result<(), RequestError> {
        Ok(())
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), RequestError>;

    /// `None` on a miss.
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RequestError>;

    /// Pattern-match read over `scan_count` keys starting at `key`.
    ///
    /// Whether the server considers the pattern matched is opaque to the
    /// harness, `None` is counted as a miss.
    async fn ret(
        &mut self,
        key: &[u8],
        pattern: &[u8],
        scan_count: usize,
    ) -> Result<Option<Vec<u8>>, RequestError>;
}

/// Hands out one client per worker.
pub trait ClientGenerator {
    type Client: KvClient;

    fn generate(&mut self, worker: usize) -> Self::Client;
}

impl<F, C> ClientGenerator for F
where
    F: FnMut(usize) -> C,
    C: KvClient,
{
    type Client = C;

    fn generate(&mut self, worker: usize) -> C {
        self(worker)
    }
}
