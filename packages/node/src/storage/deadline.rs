//! Per-call deadline for any [`MetadataStore`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{HeaderRow, MetadataStore, RecordFilter, StoreError, StoredRecord};

/// Wraps a store so that every call fails with [`StoreError::Backend`] once
/// `timeout` has elapsed.
pub struct DeadlineStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: MetadataStore> DeadlineStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.timeout, "store call timed out");
                Err(StoreError::Backend(format!(
                    "{operation} did not finish within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for DeadlineStore<S> {
    async fn list_identifiers(&self, filter: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
        self.bounded("list_identifiers", self.inner.list_identifiers(filter))
            .await
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        self.bounded("list_records", self.inner.list_records(filter))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    struct Stalled;

    #[async_trait]
    impl MetadataStore for Stalled {
        async fn list_identifiers(&self, _: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn list_records(&self, _: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn expiry_is_a_backend_error() {
        let store = DeadlineStore::new(Stalled, Duration::from_millis(50));
        let err = store.list_identifiers(&RecordFilter::all()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("list_identifiers")));
        assert!(store.list_records(&RecordFilter::all()).await.is_err());
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let store = DeadlineStore::new(MemoryStore::sample(), Duration::from_secs(30));
        let rows = store.list_identifiers(&RecordFilter::all()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
