//! Versioned pub/sub channels.
//!
//! One JSON envelope per channel under `memory/channels/`; version starts at
//! 1 and strictly increases per publish. A schema file under
//! `memory/schemas/` gates every publish and fails closed — an invalid
//! publish changes nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{MemoryError, MemoryResult};
use crate::events::{Event, EventLog};
use crate::paths::StateLayout;
use crate::store::{
    read_json, read_json_or_quarantine, validate, write_json_atomic, Schema,
};

/// A versioned channel envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub channel: String,
    pub version: u64,
    pub published_by: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    pub data: Value,
}

impl ChannelEnvelope {
    /// Normalised view of the payload: always a sequence. An object payload
    /// is a one-element sequence.
    pub fn entries(&self) -> Vec<&Value> {
        match &self.data {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Token-efficient metadata view, payload omitted.
    pub fn summary_view(&self) -> EnvelopeSummary {
        EnvelopeSummary {
            channel: self.channel.clone(),
            version: self.version,
            published_by: self.published_by.clone(),
            published_at: self.published_at,
            summary: self.summary.clone(),
            entry_count: self.entries().len(),
        }
    }
}

/// Envelope metadata without the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    pub channel: String,
    pub version: u64,
    pub published_by: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    pub entry_count: usize,
}

/// Publish-time metadata.
#[derive(Debug, Clone)]
pub struct PublishMeta {
    pub published_by: String,
    pub summary: Option<String>,
    /// Session id recorded on the `memory_published` event, when known.
    pub session_id: Option<String>,
}

/// One row of `memory/index.json` — the channel registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelIndexEntry {
    pub channel: String,
    /// Declared publisher. The contract is documented, not enforced at the
    /// filesystem layer.
    pub publisher: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Filesystem-backed channel store.
#[derive(Debug, Clone)]
pub struct ChannelStore {
    layout: StateLayout,
    events: EventLog,
}

impl ChannelStore {
    pub fn new(layout: StateLayout) -> Self {
        let events = EventLog::new(layout.event_log());
        Self { layout, events }
    }

    /// Validate, bump the version, write the envelope, record the event.
    ///
    /// Schema-invalid publishes fail and change nothing.
    pub fn publish(
        &self,
        channel: &str,
        data: Value,
        meta: PublishMeta,
    ) -> MemoryResult<ChannelEnvelope> {
        if let Some(schema) = self.load_schema(channel)? {
            validate(&schema, &data)?;
        }

        let current: Option<ChannelEnvelope> =
            read_json_or_quarantine(&self.layout.channel(channel))?;
        let version = current.map(|e| e.version).unwrap_or(0) + 1;

        let envelope = ChannelEnvelope {
            channel: channel.to_string(),
            version,
            published_by: meta.published_by.clone(),
            published_at: Utc::now(),
            summary: meta.summary,
            data,
        };
        write_json_atomic(&self.layout.channel(channel), &envelope)?;
        self.update_index(channel, &meta.published_by, version)?;

        self.events.append(&Event::memory_published(
            meta.session_id.as_deref(),
            channel,
            version,
        ))?;
        info!(channel, version, publisher = meta.published_by, "memory published");
        Ok(envelope)
    }

    /// Current envelope, or `None` for an unwritten channel.
    pub fn read(&self, channel: &str) -> MemoryResult<Option<ChannelEnvelope>> {
        Ok(read_json_or_quarantine(&self.layout.channel(channel))?)
    }

    /// Envelope metadata only.
    pub fn read_summary(&self, channel: &str) -> MemoryResult<Option<EnvelopeSummary>> {
        Ok(self.read(channel)?.map(|e| e.summary_view()))
    }

    /// All channels known to the index.
    pub fn index(&self) -> MemoryResult<Vec<ChannelIndexEntry>> {
        let index: Option<Vec<ChannelIndexEntry>> =
            read_json_or_quarantine(&self.layout.memory_index())?;
        Ok(index.unwrap_or_default())
    }

    /// Channel names from the index, sorted.
    pub fn channel_names(&self) -> MemoryResult<Vec<String>> {
        let mut names: Vec<String> = self.index()?.into_iter().map(|e| e.channel).collect();
        names.sort();
        Ok(names)
    }

    fn update_index(&self, channel: &str, publisher: &str, version: u64) -> MemoryResult<()> {
        let mut index = self.index()?;
        match index.iter_mut().find(|e| e.channel == channel) {
            Some(entry) => {
                if entry.publisher != publisher {
                    warn!(
                        channel,
                        declared = entry.publisher,
                        actual = publisher,
                        "publish by a session other than the declared publisher"
                    );
                }
                entry.version = version;
                entry.updated_at = Utc::now();
            }
            None => index.push(ChannelIndexEntry {
                channel: channel.to_string(),
                publisher: publisher.to_string(),
                version,
                updated_at: Utc::now(),
            }),
        }
        write_json_atomic(&self.layout.memory_index(), &index)?;
        Ok(())
    }

    fn load_schema(&self, channel: &str) -> MemoryResult<Option<Schema>> {
        let path = self.layout.channel_schema(channel);
        match read_json::<Value>(&path) {
            Ok(Some(raw)) => Ok(Some(Schema::new(raw))),
            Ok(None) => Ok(None),
            // Unreadable schema fails closed: reject the publish.
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> ChannelStore {
        ChannelStore::new(StateLayout::new(dir))
    }

    fn meta(publisher: &str) -> PublishMeta {
        PublishMeta {
            published_by: publisher.to_string(),
            summary: Some("test".into()),
            session_id: None,
        }
    }

    #[test]
    fn test_version_starts_at_one_and_increments() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let v1 = store
            .publish("frontend-api", json!([{"route": "/login"}]), meta("frontend"))
            .unwrap();
        assert_eq!(v1.version, 1);

        let v2 = store
            .publish("frontend-api", json!([{"route": "/logout"}]), meta("frontend"))
            .unwrap();
        assert_eq!(v2.version, 2);

        let read = store.read("frontend-api").unwrap().unwrap();
        assert_eq!(read.version, 2);
    }

    #[test]
    fn test_schema_gate_fails_closed() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        write_json_atomic(
            &store.layout.channel_schema("api-contracts"),
            &json!({
                "type": "object",
                "required": ["endpoints"],
                "properties": {"endpoints": {"type": "array"}}
            }),
        )
        .unwrap();

        // Invalid publish fails and writes nothing.
        let err = store.publish("api-contracts", json!({"wrong": 1}), meta("backend"));
        assert!(err.is_err());
        assert!(store.read("api-contracts").unwrap().is_none());

        // Valid publish goes through.
        store
            .publish(
                "api-contracts",
                json!({"endpoints": ["/api/users"]}),
                meta("backend"),
            )
            .unwrap();
        assert_eq!(store.read("api-contracts").unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_unreadable_schema_rejects_publish() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let path = store.layout.channel_schema("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{oops").unwrap();

        assert!(store.publish("broken", json!({}), meta("any")).is_err());
    }

    #[test]
    fn test_read_summary_has_no_payload() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .publish("notes", json!([1, 2, 3]), meta("pm"))
            .unwrap();

        let summary = store.read_summary("notes").unwrap().unwrap();
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.version, 1);
    }

    #[test]
    fn test_object_payload_normalises_to_sequence() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .publish("single", json!({"key": "value"}), meta("pm"))
            .unwrap();

        let envelope = store.read("single").unwrap().unwrap();
        assert_eq!(envelope.entries().len(), 1);
    }

    #[test]
    fn test_index_tracks_channels() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.publish("a", json!([]), meta("x")).unwrap();
        store.publish("b", json!([]), meta("y")).unwrap();
        store.publish("a", json!([1]), meta("x")).unwrap();

        let index = store.index().unwrap();
        assert_eq!(index.len(), 2);
        let a = index.iter().find(|e| e.channel == "a").unwrap();
        assert_eq!(a.version, 2);
        assert_eq!(a.publisher, "x");

        assert_eq!(store.channel_names().unwrap(), vec!["a", "b"]);
    }
}
