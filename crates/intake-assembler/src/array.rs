//! In-memory record buffers for `array` endpoints

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use intake_core::capabilities::{Record, RecordSink, RecordSource};

/// A shared record buffer
pub type ArrayBuffer = Arc<Mutex<Vec<Value>>>;

/// Named record buffers shared between the caller and `array` endpoints
#[derive(Clone, Default)]
pub struct ArrayStore {
    buffers: Arc<Mutex<HashMap<String, ArrayBuffer>>>,
}

impl ArrayStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer registered under `name`, created empty on first use
    pub fn buffer(&self, name: &str) -> ArrayBuffer {
        lock(&self.buffers)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Replace the contents of buffer `name`
    pub fn fill(&self, name: &str, records: impl IntoIterator<Item = Value>) {
        let buffer = self.buffer(name);
        let mut contents = lock(&buffer);
        contents.clear();
        contents.extend(records);
    }

    /// Snapshot of buffer `name`
    pub fn records(&self, name: &str) -> Vec<Value> {
        lock(&self.buffer(name)).clone()
    }

    /// Names of the buffers created so far, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.buffers).keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ArrayStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayStore")
            .field("buffers", &self.names())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads the records of a buffer in order
pub struct ArraySource {
    buffer: ArrayBuffer,
    position: usize,
}

impl ArraySource {
    /// Read `buffer` from the start
    pub fn new(buffer: ArrayBuffer) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }
}

#[async_trait]
impl RecordSource for ArraySource {
    async fn next_record(&mut self) -> anyhow::Result<Option<Record>> {
        let next = lock(&self.buffer).get(self.position).cloned();
        let Some(value) = next else {
            return Ok(None);
        };
        let position = self.position;
        self.position += 1;
        match value {
            Value::Object(record) => Ok(Some(record)),
            other => anyhow::bail!("array entry {position} is not a record: {other}"),
        }
    }
}

/// Appends written values to a buffer
pub struct ArraySink {
    buffer: ArrayBuffer,
}

impl ArraySink {
    /// Append to `buffer`
    pub fn new(buffer: ArrayBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl RecordSink for ArraySink {
    async fn write(&mut self, value: Value) -> anyhow::Result<()> {
        lock(&self.buffer).push(value);
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_source_reads_buffer_in_order() {
        let store = ArrayStore::new();
        store.fill("in", [json!({"id": 1}), json!({"id": 2})]);

        let mut source = ArraySource::new(store.buffer("in"));
        assert_eq!(source.next_record().await.unwrap().unwrap()["id"], 1);
        assert_eq!(source.next_record().await.unwrap().unwrap()["id"], 2);
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_source_rejects_non_record_entries() {
        let store = ArrayStore::new();
        store.fill("in", [json!("plain")]);
        let mut source = ArraySource::new(store.buffer("in"));
        assert!(source.next_record().await.is_err());
    }

    #[tokio::test]
    async fn test_sink_is_visible_through_store() {
        let store = ArrayStore::new();
        let mut sink = ArraySink::new(store.buffer("out"));
        sink.write(json!({"id": 7})).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(store.records("out"), vec![json!({"id": 7})]);
    }

    #[test]
    fn test_fill_replaces_contents() {
        let store = ArrayStore::new();
        store.fill("x", [json!({}), json!({})]);
        store.fill("x", [json!({"a": 1})]);
        assert_eq!(store.records("x").len(), 1);
        assert_eq!(format!("{store:?}"), r#"ArrayStore { buffers: ["x"] }"#);
    }
}
