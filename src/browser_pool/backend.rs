//! Session backends: how the pool creates and destroys its handles

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Factory for expensive external sessions (headless browsers, remote drivers)
///
/// The pool owns every handle a backend creates and hands it back through
/// [`SessionBackend::destroy`] exactly once, on idle sweep or shutdown.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    type Handle: Send + Sync + 'static;

    /// Short name for logs ("chromium-system", "chromium-managed", ...)
    fn name(&self) -> &str;

    async fn create(&self) -> Result<Self::Handle>;

    /// Tear down a session. Other `Arc` clones may still be alive when a busy
    /// session is destroyed at shutdown; implementations must tolerate that.
    async fn destroy(&self, handle: Arc<Self::Handle>) -> Result<()>;
}
