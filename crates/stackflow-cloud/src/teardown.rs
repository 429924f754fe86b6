//! Teardown of a deployed stack and its staging bucket

use crate::error::Result;
use crate::poller::{CompletionPoller, until_deleted};
use crate::provider::{ArtifactStore, Removal, StackApi};
use crate::state::PersistedState;

/// Deletes the stack and, when the bucket was provisioned by us, drains and
/// deletes the staging bucket.
///
/// The two have no data dependency and run concurrently; both must finish
/// (or be found already gone) for the removal to succeed.
pub struct TeardownSequencer<'a> {
    stacks: &'a dyn StackApi,
    store: &'a dyn ArtifactStore,
    poller: &'a CompletionPoller,
}

impl<'a> TeardownSequencer<'a> {
    pub fn new(
        stacks: &'a dyn StackApi,
        store: &'a dyn ArtifactStore,
        poller: &'a CompletionPoller,
    ) -> Self {
        Self {
            stacks,
            store,
            poller,
        }
    }

    pub async fn remove(&self, state: &PersistedState) -> Result<()> {
        if state.external_bucket {
            tracing::debug!("Keeping external bucket {}", state.bucket);
            return self.delete_stack(&state.stack_name).await;
        }

        tokio::try_join!(
            self.delete_stack(&state.stack_name),
            self.drain_bucket(&state.bucket)
        )?;
        Ok(())
    }

    /// Delete the stack and wait for `DELETE_COMPLETE`
    pub async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        tracing::info!("Deleting stack {}", stack_name);
        match self.stacks.delete_stack(stack_name).await? {
            Removal::AlreadyAbsent => {
                tracing::debug!("Stack {} does not exist", stack_name);
                Ok(())
            }
            Removal::Removed => {
                self.poller
                    .wait_for(self.stacks, stack_name, until_deleted())
                    .await?;
                tracing::info!("Stack {} deleted", stack_name);
                Ok(())
            }
        }
    }

    /// Empty the bucket page by page, then delete it
    pub async fn drain_bucket(&self, bucket: &str) -> Result<()> {
        tracing::info!("Deleting bucket {}", bucket);
        let mut token: Option<String> = None;
        let mut deleted = 0usize;

        loop {
            let Some(page) = self.store.list_page(bucket, token.as_deref()).await? else {
                tracing::debug!("Bucket {} does not exist", bucket);
                return Ok(());
            };

            if !page.keys.is_empty() {
                self.store.delete_batch(bucket, &page.keys).await?;
                deleted += page.keys.len();
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!("Deleted {} objects from {}", deleted, bucket);
        if self.store.delete_bucket(bucket).await? == Removal::AlreadyAbsent {
            tracing::debug!("Bucket {} was already gone", bucket);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeArtifactStore, FakeStackApi, InstantSleeper, StoreEvent};
    use std::sync::Arc;

    fn poller() -> CompletionPoller {
        CompletionPoller::default().with_sleeper(Arc::new(InstantSleeper::default()))
    }

    fn state(external_bucket: bool) -> PersistedState {
        PersistedState {
            bucket: "staging".to_string(),
            external_bucket,
            region: "us-east-1".to_string(),
            stack_name: "api".to_string(),
        }
    }

    #[tokio::test]
    async fn test_drain_follows_continuation_tokens() {
        let stacks = FakeStackApi::new();
        let store = FakeArtifactStore::new().with_page_size(2);
        store.seed_bucket("staging", &["a", "b", "c", "d", "e"]);
        let poller = poller();

        TeardownSequencer::new(&stacks, &store, &poller)
            .drain_bucket("staging")
            .await
            .unwrap();

        assert_eq!(
            store.events(),
            vec![
                StoreEvent::ListPage,
                StoreEvent::DeleteBatch(2),
                StoreEvent::ListPage,
                StoreEvent::DeleteBatch(2),
                StoreEvent::ListPage,
                StoreEvent::DeleteBatch(1),
                StoreEvent::DeleteBucket,
            ]
        );
        assert!(!store.bucket_exists("staging"));
    }

    #[tokio::test]
    async fn test_missing_bucket_is_success() {
        let stacks = FakeStackApi::new();
        let store = FakeArtifactStore::new();
        let poller = poller();

        TeardownSequencer::new(&stacks, &store, &poller)
            .remove(&state(false))
            .await
            .unwrap();

        assert_eq!(store.events(), vec![StoreEvent::ListPage]);
    }

    #[tokio::test]
    async fn test_external_bucket_is_kept() {
        let stacks = FakeStackApi::new();
        stacks.seed_stack("api", "CREATE_COMPLETE", "{}");
        let store = FakeArtifactStore::new();
        store.seed_bucket("staging", &["api/template.json"]);
        let poller = poller();

        TeardownSequencer::new(&stacks, &store, &poller)
            .remove(&state(true))
            .await
            .unwrap();

        assert!(store.events().is_empty());
        assert!(store.bucket_exists("staging"));
        assert!(!stacks.stack_exists("api"));
    }

    #[tokio::test]
    async fn test_stack_deletion_failure_surfaces() {
        let stacks = FakeStackApi::new();
        stacks.seed_stack("api", "CREATE_COMPLETE", "{}");
        stacks.fail_next_delete();
        let store = FakeArtifactStore::new();
        let poller = poller();

        let err = TeardownSequencer::new(&stacks, &store, &poller)
            .delete_stack("api")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("DELETE_FAILED"));
    }
}
