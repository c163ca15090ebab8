use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use serde_json::Value;
use crate::error::TransportError;
use super::backend::{FilePart, Transport};

enum Scripted {
    Json(Value),
    Bytes(Vec<u8>),
    Status(u16, String),
}

/// In-memory transport answering each path from a queue of canned replies.
/// An exhausted queue answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<HashMap<String, Value>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, path: &str, reply: Scripted) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn push_ok(&self, path: &str, value: Value) {
        self.push(path, Scripted::Json(value));
    }

    pub fn push_bytes(&self, path: &str, bytes: Vec<u8>) {
        self.push(path, Scripted::Bytes(bytes));
    }

    pub fn push_status(&self, path: &str, status: u16, body: &str) {
        self.push(path, Scripted::Status(status, body.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.split_once(' ').is_some_and(|(_, p)| p == path))
            .count()
    }

    pub fn remaining(&self, path: &str) -> usize {
        self.replies.lock().unwrap().get(path).map_or(0, VecDeque::len)
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.bodies.lock().unwrap().get(path).cloned()
    }

    fn next(&self, method: &str, path: &str) -> Scripted {
        self.calls.lock().unwrap().push(format!("{method} {path}"));
        self.replies
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Scripted::Status(404, format!("no scripted reply for {path}")))
    }

    fn next_json(&self, method: &str, path: &str) -> Result<Value, TransportError> {
        match self.next(method, path) {
            Scripted::Json(value) => Ok(value),
            Scripted::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Scripted::Status(status, body) => Err(TransportError::Status { status, body }),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        self.next_json("GET", path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.bodies.lock().unwrap().insert(path.to_string(), body);
        self.next_json("POST", path)
    }

    async fn post_file(&self, path: &str, _file: FilePart) -> Result<Value, TransportError> {
        self.next_json("POST", path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        match self.next("GET", path) {
            Scripted::Bytes(bytes) => Ok(bytes),
            Scripted::Json(value) => Ok(value.to_string().into_bytes()),
            Scripted::Status(status, body) => Err(TransportError::Status { status, body }),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("http://backend.test/api{path}")
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbaImage::new(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
