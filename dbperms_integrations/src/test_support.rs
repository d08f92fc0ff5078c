use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::TransportError;
use crate::transport::{ApiRequest, Transport};

type Reply = Result<Value, TransportError>;

/// Scripted transport: replies are keyed by "METHOD path" and every request is recorded.
/// A key with several queued replies hands them out in order, repeating the last one.
#[derive(Default)]
pub struct StubTransport {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: &str, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(format!("{} {}", method, path))
            .or_default()
            .push(reply);
    }

    pub fn respond(&self, method: &str, path: &str, body: Value) {
        self.push(method, path, Ok(body));
    }

    pub fn fail(&self, method: &str, path: &str, status: u16, message: &str) {
        self.push(method, path, Err(TransportError::from_status(status, message)));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let key = format!("{} {}", request.method, request.path);
        self.calls.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(TransportError::from_status(404, format!("no stub for {}", key))),
        }
    }
}
