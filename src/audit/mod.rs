//! Mission message log
//!
//! Append-only record of every dispatched message, in dispatch order.

use crate::message::{AgentId, Message, MessageKind};
use sha2::{Digest, Sha256};
use std::io::Write;

/// Ordered audit trail of one mission
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// Failure entries attributed to `agent`
    pub fn failures_from(&self, agent: AgentId) -> Vec<&Message> {
        self.entries
            .iter()
            .filter(|m| m.kind() == MessageKind::AgentFailure && m.from() == agent)
            .collect()
    }

    /// SHA256 over the serialized log, hex encoded
    pub fn fingerprint(&self) -> String {
        compute_log_hash(&self.entries)
    }
}

/// Uses zero-copy streaming serialization into hasher
pub fn compute_log_hash(entries: &[Message]) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), entries).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
