//! Contracts between the pipeline and whatever performs a fetch.
//!
//! The pipeline never talks to a transport directly. For each work item it
//! asks a [`FetchOperationFactory`] for a [`FetchOperation`] and calls
//! [`FetchOperation::content`] once per attempt.

use async_trait::async_trait;
use serde_json::Value;

use super::FetchError;
use crate::source::WorkItem;

/// One fetch-and-parse attempt against a remote resource.
///
/// Implementations must be safe to call repeatedly: the retry wrapper calls
/// `content` again after a failed attempt.
#[async_trait]
pub trait FetchOperation: Send + Sync {
    /// Performs a single attempt and returns the parsed payload.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing why the attempt failed.
    async fn content(&self) -> Result<Value, FetchError>;
}

/// Builds a [`FetchOperation`] for each work item.
///
/// Implemented by [`GetApiCallFactory`](super::GetApiCallFactory) and by any
/// `Fn(&WorkItem) -> Box<dyn FetchOperation>` closure.
pub trait FetchOperationFactory: Send + Sync + 'static {
    /// Creates the operation that fetches `item`.
    fn create(&self, item: &WorkItem) -> Box<dyn FetchOperation>;
}

impl<F> FetchOperationFactory for F
where
    F: Fn(&WorkItem) -> Box<dyn FetchOperation> + Send + Sync + 'static,
{
    fn create(&self, item: &WorkItem) -> Box<dyn FetchOperation> {
        self(item)
    }
}
