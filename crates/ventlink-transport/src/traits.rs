use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::gatt::Characteristic;

/// Callback invoked with the raw bytes of each notification.
///
/// May run on any task, concurrently with an in-flight write or read.
pub type NotificationHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Callback invoked when the link drops without a local `disconnect()`.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Byte-oriented link to one unit.
///
/// Methods take `&self`: adapters keep their own interior state, and the
/// session serializes protocol exchanges on top. Implementations must not
/// invoke the disconnect handler for a disconnect the caller requested.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Device address this adapter talks to.
    fn address(&self) -> &str;

    /// Open the link, giving up after `timeout`.
    async fn connect(&self, timeout: Duration) -> Result<()>;

    /// Close the link. Closing an already closed link is not an error.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_connected(&self) -> bool;

    /// Write `data` to a characteristic, optionally requesting a link-level ack.
    async fn write(&self, characteristic: Characteristic, data: &[u8], with_response: bool)
        -> Result<()>;

    /// Read the current value of a characteristic.
    async fn read(&self, characteristic: Characteristic) -> Result<Bytes>;

    /// Enable notifications, delivering each one to `handler`.
    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationHandler,
    ) -> Result<()>;

    /// Disable notifications.
    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<()>;

    /// Register the handler for spontaneous link loss, replacing any previous one.
    fn on_disconnect(&self, handler: DisconnectHandler);
}
