//! Test doubles for the three collaborators the sync core is built on.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for integration tests and hosts that drive the core without a server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{StorageError, SyncError, SyncResult};
use crate::network::{ApiRequest, ApiResponse, Transport};
use crate::storage::{MemoryStorage, Storage};
use crate::sync::clock::Clock;

type RouteKey = (String, String);

#[derive(Clone)]
enum Reply {
    Respond(ApiResponse),
    NetworkError(String),
}

/// Releases requests parked on a held route.
#[derive(Clone, Default)]
pub struct Gate {
    notify: Arc<Notify>,
}

impl Gate {
    /// Let one parked (or the next) request through.
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct Script {
    replies: HashMap<RouteKey, Reply>,
    holds: HashMap<RouteKey, Gate>,
    requests: Vec<ApiRequest>,
}

/// In-memory [`Transport`] answering from per-route scripts.
///
/// Each route answers with its latest scripted reply; unscripted routes
/// answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

fn key(method: &str, path: &str) -> RouteKey {
    (
        method.to_ascii_uppercase(),
        path.trim_start_matches('/').to_string(),
    )
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to the route with this response until replaced.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.script
            .lock()
            .replies
            .insert(key(method, path), Reply::Respond(ApiResponse::new(status, body)));
    }

    pub fn respond_json(&self, method: &str, path: &str, body: serde_json::Value) {
        self.respond(method, path, 200, &body.to_string());
    }

    pub fn fail(&self, method: &str, path: &str, reason: &str) {
        self.script
            .lock()
            .replies
            .insert(key(method, path), Reply::NetworkError(reason.to_string()));
    }

    /// Park every call to the route until the returned gate is released.
    pub fn hold(&self, method: &str, path: &str) -> Gate {
        let gate = Gate::default();
        self.script
            .lock()
            .holds
            .insert(key(method, path), gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<ApiRequest> {
        let (method, path) = key(method, path);
        self.script
            .lock()
            .requests
            .iter()
            .filter(|r| r.method.to_string() == method && r.path.trim_start_matches('/') == path)
            .cloned()
            .collect()
    }

    pub fn calls(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let route = key(&request.method.to_string(), &request.path);
        let gate = {
            let mut script = self.script.lock();
            script.requests.push(request);
            script.holds.get(&route).cloned()
        };

        if let Some(gate) = gate {
            gate.notify.notified().await;
        }

        let reply = self.script.lock().replies.get(&route).cloned();

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::NetworkError(reason)) => Err(SyncError::TransientNetwork(reason)),
            None => Ok(ApiResponse::new(404, "")),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 2024-05-01T12:00:00Z, a fixed point for reproducible tests.
    pub fn fixed() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Storage whose every operation fails, as when a browser blocks storage.
#[derive(Default)]
pub struct FailingStorage;

impl Storage for FailingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }
}

/// Memory storage that fails a set number of writes or removals on request.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing_sets: Mutex<usize>,
    failing_removes: Mutex<usize>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sets(&self, count: usize) {
        *self.failing_sets.lock() = count;
    }

    pub fn fail_next_removes(&self, count: usize) {
        *self.failing_removes.lock() = count;
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

fn take_failure(counter: &Mutex<usize>) -> bool {
    let mut remaining = counter.lock();
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

impl Storage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if take_failure(&self.failing_sets) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if take_failure(&self.failing_removes) {
            return Err(StorageError::Unavailable("storage locked".to_string()));
        }
        self.inner.remove(key)
    }
}
