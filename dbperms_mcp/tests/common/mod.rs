#![allow(dead_code)]

use async_trait::async_trait;
use dbperms_integrations::{ApiRequest, Transport, TransportError};
use dbperms_mcp::{Dispatcher, ToolInvocation, ToolResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Reply = Result<Value, TransportError>;
type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Transport double: records every request and answers from a script.
///
/// Replies are keyed by "METHOD path"; queued replies are used in order and the
/// last one repeats. A handler, when registered for a key, computes the reply instead.
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &str, path: &str, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry(key(method, path))
            .or_default()
            .push(Ok(body));
    }

    pub fn fail(&self, method: &str, path: &str, status: u16, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .entry(key(method, path))
            .or_default()
            .push(Err(TransportError::from_status(status, message)));
    }

    pub fn handle<F>(&self, method: &str, path: &str, handler: F)
    where
        F: Fn(&ApiRequest) -> Reply + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(key(method, path), Box::new(handler));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }
}

fn key(method: &str, path: &str) -> String {
    format!("{} {}", method, path)
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let key = key(request.method.as_str(), &request.path);
        self.calls.lock().unwrap().push(request.clone());

        if let Some(handler) = self.handlers.lock().unwrap().get(&key) {
            return handler(&request);
        }
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(TransportError::from_status(404, format!("no stub for {}", key))),
        }
    }
}

pub async fn call(dispatcher: &Dispatcher, tool: &str, params: Value) -> ToolResult {
    let params = params.as_object().cloned().expect("params must be a JSON object");
    dispatcher.dispatch(ToolInvocation::new(tool, params)).await
}
