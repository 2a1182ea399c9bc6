//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use super::api::{ApiClient, ApiRequest, Transport};
use super::types::ApiError;

pub(crate) const TEST_BASE_URL: &str = "http://identity.test";
pub(crate) const TEST_KEY_HEADER: &str = "X-API-Key";

/// Replies are queued per path; a path with an empty queue fails with a
/// transport error so unexpected calls show up in assertions.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

/// Holds replies for one path until released.
pub(crate) struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let one held request through.
    pub(crate) fn release(&self) {
        self.0.add_permits(1);
    }
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, path: &str, body: Value) {
        self.push(path, Ok(body));
    }

    pub(crate) fn fail(&self, path: &str, error: ApiError) {
        self.push(path, Err(error));
    }

    fn push(&self, path: &str, reply: Result<Value, ApiError>) {
        self.replies
            .lock()
            .expect("mock mutex should lock")
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
    }

    /// Requests to `path` wait until the returned gate is released.
    pub(crate) fn hold(&self, path: &str) -> Gate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .expect("mock mutex should lock")
            .insert(path.to_owned(), Arc::clone(&semaphore));
        Gate(semaphore)
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("mock mutex should lock").clone()
    }

    pub(crate) fn calls(&self, path: &str) -> usize {
        let url = format!("{TEST_BASE_URL}{path}");
        self.requests().iter().filter(|r| r.url == url).count()
    }

    pub(crate) fn last_request(&self, path: &str) -> Option<ApiRequest> {
        let url = format!("{TEST_BASE_URL}{path}");
        self.requests().into_iter().rev().find(|r| r.url == url)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let path = request.url.strip_prefix(TEST_BASE_URL).unwrap_or(&request.url).to_owned();
        self.requests.lock().expect("mock mutex should lock").push(request);

        let gate = self.gates.lock().expect("mock mutex should lock").get(&path).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate semaphore should stay open").forget();
        }

        self.replies
            .lock()
            .expect("mock mutex should lock")
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ApiError::Transport(format!("no scripted reply for {path}"))))
    }
}

/// API client wired to `mock`.
pub(crate) fn mock_client(mock: &Arc<MockTransport>) -> ApiClient {
    let transport: Arc<dyn Transport> = Arc::clone(mock) as Arc<dyn Transport>;
    ApiClient::new(TEST_BASE_URL, TEST_KEY_HEADER, transport)
}
