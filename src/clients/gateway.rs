use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Transport used to send outbound legs and read status documents.
///
/// `Ok(false)` means the transport refused the message; `Err` means the
/// operation itself failed. Both count as a send failure for the leg.
#[async_trait]
pub trait QueueGateway: Send + Sync {
    async fn send_local(&self, queue_name: &str, body: &str) -> Result<bool>;

    async fn send_remote(&self, remote_address: &str, body: &str) -> Result<bool>;

    /// Waits at most `timeout` for one message. `None` when the queue stayed empty.
    async fn receive(&self, queue_name: &str, timeout: Duration) -> Result<Option<String>>;

    async fn is_healthy(&self) -> bool;
}

/// Builds the `"<exchange>/<routing_key>"` form used for remote sends.
pub fn remote_address(exchange: &str, queue_name: &str) -> String {
    format!("{}/{}", exchange, queue_name)
}
