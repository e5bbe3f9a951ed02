use async_trait::async_trait;

use crate::Result;
use crate::shutdown::Shutdown;

/// A long-running receive loop.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Runs until `shutdown` fires or the subscription ends.
    async fn run(&self, shutdown: Shutdown) -> Result<()>;
}
