use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::ConnectorError;
use crate::messages::Tick;

/// Unbounded sequence of ticks from one connection. The stream ends (rather
/// than erroring) on close, idle timeout or protocol error.
pub type TickStream = BoxStream<'static, Tick>;

/// Source of price ticks for a set of wire symbols (websocket feed, test double)
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Open a fresh connection subscribed to `symbols` and return its ticks.
    ///
    /// Each call starts from scratch; nothing is reused from earlier calls.
    async fn subscribe(&self, symbols: &[String]) -> Result<TickStream, ConnectorError>;
}
