use async_trait::async_trait;

/// Data structure that needs to be teared down asynchronously.
///
/// This trait is used in the place of `AsyncDrop`, which is unfortunately
/// not available for now. Owners must call `teardown()` explicitly once they
/// are done; dropping without it leaves the resource behind.
#[async_trait]
pub trait AsyncTeardown: Sync + Send {
    async fn teardown(&mut self);
}
