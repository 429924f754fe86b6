//! In-memory fakes of the capability traits
//!
//! The fakes model just enough of the remote behaviour to exercise the
//! engine: stacks move through scripted statuses one `describe` at a time,
//! buckets list in key order with key-based continuation tokens, and every
//! call is counted so tests can assert on what was (not) done.

use crate::error::{CloudError, Result};
use crate::poller::Sleeper;
use crate::provider::{
    ActiveTemplate, ArtifactStore, BucketProvisioner, ObjectPage, Removal, RemoteStack, StackApi,
    StackOutput, StackRequest, StackStatus, StagingObject, TemplateSource, UpdateOutcome,
};
use crate::state::{PersistedState, StateStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Marks an observation where the stack no longer exists
pub const ABSENT: &str = "<absent>";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct FakeStack {
    status: StackStatus,
    body: String,
    parameters: BTreeMap<String, String>,
    termination_protection: bool,
}

impl FakeStack {
    fn new(status: StackStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            parameters: BTreeMap::new(),
            termination_protection: false,
        }
    }

    fn view(&self, name: &str) -> RemoteStack {
        RemoteStack {
            name: name.to_string(),
            status: self.status.clone(),
            outputs: outputs_of(&self.body),
            parameters: self.parameters.clone(),
            termination_protection: self.termination_protection,
        }
    }
}

/// `Outputs.<Key>.Value` entries of a JSON template whose value is a string
fn outputs_of(body: &str) -> Vec<StackOutput> {
    let Ok(template) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    template
        .get("Outputs")
        .and_then(|o| o.as_object())
        .map(|outputs| {
            outputs
                .iter()
                .filter_map(|(key, output)| {
                    output.get("Value").and_then(|v| v.as_str()).map(|value| StackOutput {
                        key: key.clone(),
                        value: value.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct StackInner {
    stacks: BTreeMap<String, FakeStack>,
    script: BTreeMap<String, VecDeque<Option<StackStatus>>>,
    requests: Vec<StackRequest>,
    protection_calls: Vec<bool>,
    describe_calls: usize,
    get_template_calls: usize,
    create_calls: usize,
    update_calls: usize,
    delete_calls: usize,
    no_changes_on_update: bool,
    roll_back_next_update: bool,
    fail_next_delete: bool,
    get_template_error: Option<String>,
}

/// Fake control plane
#[derive(Clone, Default)]
pub struct FakeStackApi {
    inner: Arc<Mutex<StackInner>>,
    store: Option<FakeArtifactStore>,
}

impl FakeStackApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve template URLs against `store`
    pub fn with_store(mut self, store: FakeArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn seed_stack(&self, name: &str, status: &str, body: &str) {
        lock(&self.inner)
            .stacks
            .insert(name.to_string(), FakeStack::new(StackStatus::from(status), body));
    }

    /// Queue statuses returned by the next `describe` calls, one per call.
    /// The last one sticks. [`ABSENT`] removes the stack.
    pub fn script_statuses(&self, name: &str, statuses: &[&str]) {
        let mut inner = lock(&self.inner);
        let queue = inner.script.entry(name.to_string()).or_default();
        for status in statuses {
            queue.push_back(if *status == ABSENT {
                None
            } else {
                Some(StackStatus::from(*status))
            });
        }
    }

    /// Change the protection flag behind the engine's back
    pub fn set_remote_termination_protection(&self, name: &str, enabled: bool) {
        if let Some(stack) = lock(&self.inner).stacks.get_mut(name) {
            stack.termination_protection = enabled;
        }
    }

    /// Every later update reports "No updates are to be performed"
    pub fn report_no_changes_on_update(&self) {
        lock(&self.inner).no_changes_on_update = true;
    }

    /// The next update is accepted and then rolled back
    pub fn roll_back_next_update(&self) {
        lock(&self.inner).roll_back_next_update = true;
    }

    /// The next delete ends in `DELETE_FAILED`
    pub fn fail_next_delete(&self) {
        lock(&self.inner).fail_next_delete = true;
    }

    pub fn fail_get_template(&self, message: &str) {
        lock(&self.inner).get_template_error = Some(message.to_string());
    }

    pub fn stack_exists(&self, name: &str) -> bool {
        lock(&self.inner).stacks.contains_key(name)
    }

    pub fn active_body(&self, name: &str) -> Option<String> {
        lock(&self.inner).stacks.get(name).map(|s| s.body.clone())
    }

    pub fn describe_calls(&self) -> usize {
        lock(&self.inner).describe_calls
    }

    pub fn get_template_calls(&self) -> usize {
        lock(&self.inner).get_template_calls
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.inner).create_calls
    }

    pub fn update_calls(&self) -> usize {
        lock(&self.inner).update_calls
    }

    pub fn delete_calls(&self) -> usize {
        lock(&self.inner).delete_calls
    }

    pub fn protection_calls(&self) -> Vec<bool> {
        lock(&self.inner).protection_calls.clone()
    }

    pub fn last_request(&self) -> Option<StackRequest> {
        lock(&self.inner).requests.last().cloned()
    }

    fn template_body(&self, source: &TemplateSource) -> Result<String> {
        match source {
            TemplateSource::Body(body) => Ok(body.clone()),
            TemplateSource::Url(url) => {
                let Some(store) = &self.store else {
                    return Ok(url.clone());
                };
                let bytes = url
                    .strip_prefix("fake://")
                    .and_then(|rest| rest.split_once('/'))
                    .and_then(|(bucket, key)| store.object(bucket, key))
                    .ok_or_else(|| {
                        CloudError::Remote(format!("Template URL {} is not accessible", url))
                    })?;
                String::from_utf8(bytes)
                    .map_err(|e| CloudError::Remote(format!("Template is not UTF-8: {}", e)))
            }
        }
    }
}

#[async_trait]
impl StackApi for FakeStackApi {
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<RemoteStack>> {
        let mut inner = lock(&self.inner);
        inner.describe_calls += 1;

        let next = inner
            .script
            .get_mut(stack_name)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(None) => {
                inner.stacks.remove(stack_name);
            }
            Some(Some(status)) => {
                let stack = inner
                    .stacks
                    .entry(stack_name.to_string())
                    .or_insert_with(|| FakeStack::new(status.clone(), "{}"));
                stack.status = status;
            }
            None => {}
        }

        Ok(inner.stacks.get(stack_name).map(|s| s.view(stack_name)))
    }

    async fn get_active_template(&self, stack_name: &str) -> Result<Option<ActiveTemplate>> {
        let mut inner = lock(&self.inner);
        inner.get_template_calls += 1;
        if let Some(message) = &inner.get_template_error {
            return Err(CloudError::Remote(message.clone()));
        }
        Ok(inner.stacks.get(stack_name).map(|s| ActiveTemplate {
            body: s.body.clone(),
            parameters: s.parameters.clone(),
        }))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<()> {
        let body = self.template_body(&request.template)?;
        let mut inner = lock(&self.inner);
        inner.create_calls += 1;
        inner.requests.push(request.clone());

        if inner.stacks.contains_key(&request.stack_name) {
            return Err(CloudError::Remote(format!(
                "Stack [{}] already exists",
                request.stack_name
            )));
        }

        let mut stack = FakeStack::new(StackStatus::CreateInProgress, body);
        stack.parameters = request.parameters.clone();
        inner.stacks.insert(request.stack_name.clone(), stack);
        inner.script.insert(
            request.stack_name.clone(),
            VecDeque::from([
                Some(StackStatus::CreateInProgress),
                Some(StackStatus::CreateComplete),
            ]),
        );
        Ok(())
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome> {
        let body = self.template_body(&request.template)?;
        let mut inner = lock(&self.inner);
        inner.update_calls += 1;
        inner.requests.push(request.clone());

        let no_changes_on_update = inner.no_changes_on_update;
        let roll_back = std::mem::take(&mut inner.roll_back_next_update);
        let Some(stack) = inner.stacks.get_mut(&request.stack_name) else {
            return Err(CloudError::Remote(format!(
                "Stack with id {} does not exist",
                request.stack_name
            )));
        };

        if no_changes_on_update || (stack.body == body && stack.parameters == request.parameters)
        {
            return Ok(UpdateOutcome::NoChanges);
        }

        let script = if roll_back {
            VecDeque::from([
                Some(StackStatus::UpdateInProgress),
                Some(StackStatus::from("UPDATE_ROLLBACK_IN_PROGRESS")),
                Some(StackStatus::from("UPDATE_ROLLBACK_COMPLETE")),
            ])
        } else {
            stack.body = body;
            stack.parameters = request.parameters.clone();
            VecDeque::from([
                Some(StackStatus::UpdateInProgress),
                Some(StackStatus::UpdateComplete),
            ])
        };
        stack.status = StackStatus::UpdateInProgress;
        inner.script.insert(request.stack_name.clone(), script);
        Ok(UpdateOutcome::Updated)
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<Removal> {
        let mut inner = lock(&self.inner);
        inner.delete_calls += 1;

        let Some(stack) = inner.stacks.get(stack_name) else {
            return Ok(Removal::AlreadyAbsent);
        };
        if stack.termination_protection {
            return Err(CloudError::Remote(format!(
                "Stack [{}] cannot be deleted while termination protection is enabled",
                stack_name
            )));
        }

        let script = if std::mem::take(&mut inner.fail_next_delete) {
            VecDeque::from([
                Some(StackStatus::DeleteInProgress),
                Some(StackStatus::DeleteFailed),
            ])
        } else {
            VecDeque::from([Some(StackStatus::DeleteInProgress), None])
        };
        inner.script.insert(stack_name.to_string(), script);
        Ok(Removal::Removed)
    }

    async fn set_termination_protection(&self, stack_name: &str, enabled: bool) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.protection_calls.push(enabled);
        match inner.stacks.get_mut(stack_name) {
            Some(stack) => {
                stack.termination_protection = enabled;
                Ok(())
            }
            None => Err(CloudError::Remote(format!(
                "Stack with id {} does not exist",
                stack_name
            ))),
        }
    }
}

/// Store calls in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Put(String),
    ListPage,
    DeleteBatch(usize),
    DeleteBucket,
}

#[derive(Default)]
struct StoreInner {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    puts: Vec<StagingObject>,
    events: Vec<StoreEvent>,
}

/// Fake object store
#[derive(Clone)]
pub struct FakeArtifactStore {
    inner: Arc<Mutex<StoreInner>>,
    page_size: usize,
}

impl Default for FakeArtifactStore {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            page_size: 1000,
        }
    }
}

impl FakeArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        lock(&self.inner)
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    pub fn seed_bucket(&self, bucket: &str, keys: &[&str]) {
        let mut inner = lock(&self.inner);
        let objects = inner.buckets.entry(bucket.to_string()).or_default();
        for key in keys {
            objects.insert(key.to_string(), Vec::new());
        }
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        lock(&self.inner).buckets.contains_key(bucket)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.inner)
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        lock(&self.inner)
            .buckets
            .get(bucket)
            .map(|objects| objects.len())
            .unwrap_or(0)
    }

    pub fn puts(&self) -> Vec<StagingObject> {
        lock(&self.inner).puts.clone()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        lock(&self.inner).events.clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn put_object(&self, object: &StagingObject) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.events.push(StoreEvent::Put(object.key.clone()));
        let Some(objects) = inner.buckets.get_mut(&object.bucket) else {
            return Err(CloudError::Remote(format!(
                "NoSuchBucket: {}",
                object.bucket
            )));
        };
        objects.insert(object.key.clone(), object.body.clone());
        inner.puts.push(object.clone());
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<Option<ObjectPage>> {
        let mut inner = lock(&self.inner);
        inner.events.push(StoreEvent::ListPage);
        let Some(objects) = inner.buckets.get(bucket) else {
            return Ok(None);
        };

        let mut remaining = objects
            .keys()
            .filter(|key| continuation_token.is_none_or(|token| key.as_str() > token));
        let keys: Vec<String> = remaining.by_ref().take(self.page_size).cloned().collect();
        let next_token = match remaining.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(Some(ObjectPage { keys, next_token }))
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.events.push(StoreEvent::DeleteBatch(keys.len()));
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<Removal> {
        let mut inner = lock(&self.inner);
        inner.events.push(StoreEvent::DeleteBucket);
        match inner.buckets.get(bucket) {
            None => Ok(Removal::AlreadyAbsent),
            Some(objects) if !objects.is_empty() => Err(CloudError::Remote(format!(
                "BucketNotEmpty: {} still holds {} objects",
                bucket,
                objects.len()
            ))),
            Some(_) => {
                inner.buckets.remove(bucket);
                Ok(Removal::Removed)
            }
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("fake://{}/{}", bucket, key)
    }
}

/// Provisions numbered buckets in a [`FakeArtifactStore`]
#[derive(Clone)]
pub struct FakeBucketProvisioner {
    store: FakeArtifactStore,
    provisioned: Arc<Mutex<Vec<String>>>,
}

impl FakeBucketProvisioner {
    pub fn new(store: FakeArtifactStore) -> Self {
        Self {
            store,
            provisioned: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.provisioned).len()
    }

    pub fn last_bucket(&self) -> Option<String> {
        lock(&self.provisioned).last().cloned()
    }
}

#[async_trait]
impl BucketProvisioner for FakeBucketProvisioner {
    async fn provision(&self, stack_name: &str) -> Result<String> {
        let mut provisioned = lock(&self.provisioned);
        let bucket = format!("stackflow-{}-{}", stack_name, provisioned.len() + 1);
        self.store.create_bucket(&bucket);
        provisioned.push(bucket.clone());
        Ok(bucket)
    }
}

#[derive(Default)]
struct MemoryInner {
    state: Option<PersistedState>,
    saves: usize,
    clears: usize,
}

/// State store kept in memory
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        lock(&store.inner).state = Some(state);
        store
    }

    pub fn current(&self) -> Option<PersistedState> {
        lock(&self.inner).state.clone()
    }

    pub fn saves(&self) -> usize {
        lock(&self.inner).saves
    }

    pub fn clears(&self) -> usize {
        lock(&self.inner).clears
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        Ok(lock(&self.inner).state.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.state = None;
        inner.clears += 1;
        Ok(())
    }
}

/// Records requested sleeps and only yields to the scheduler
#[derive(Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn sleeps(&self) -> usize {
        lock(&self.slept).len()
    }

    pub fn total(&self) -> Duration {
        lock(&self.slept).iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.slept).push(duration);
        tokio::task::yield_now().await;
    }
}
