use std::io::ErrorKind;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::PersistenceError;
use super::params::ControlParams;
use super::record::{ConversationEntry, OperationRecord, OperationRequest, Role, SessionRecord};

/// On-disk shape of a whole session: every image's conversation plus the
/// active key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub timestamp: String,
    pub current_image: Option<String>,
    #[serde(default)]
    pub conversations: IndexMap<String, ConversationDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDocument {
    #[serde(default)]
    pub messages: Vec<ConversationEntry>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub cv2_operations: Vec<OperationRecord>,
    #[serde(default)]
    pub control_states: ControlParams,
    #[serde(default)]
    pub processed_image: Option<String>,
}

/// Per-image session registry with a single active key.
///
/// Invariant: `active`, when set, names a key present in `records`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStore {
    records: IndexMap<String, SessionRecord>,
    active: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `key` active, creating an empty record on first sight.
    ///
    /// Returns `true` when a record was created. A known key keeps its
    /// history and its original bytes.
    pub fn set_current(&mut self, key: &str, image_bytes: Vec<u8>, image_path: Option<String>) -> bool {
        let created = !self.records.contains_key(key);
        if created {
            self.records
                .insert(key.to_string(), SessionRecord::new(image_bytes, image_path));
        }
        self.active = Some(key.to_string());
        created
    }

    /// Repoints the active key. Unknown keys leave the store untouched.
    pub fn switch(&mut self, key: &str) -> bool {
        if !self.records.contains_key(key) {
            return false;
        }
        self.active = Some(key.to_string());
        true
    }

    pub fn active_key(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&SessionRecord> {
        self.active.as_deref().and_then(|key| self.records.get(key))
    }

    pub fn get(&self, key: &str) -> Option<&SessionRecord> {
        self.records.get(key)
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends to the active record. No-op (returns `false`) without one.
    pub fn append_message(&mut self, role: Role, text: &str) -> bool {
        match self.active.clone() {
            Some(key) => self.append_message_to(&key, role, text),
            None => false,
        }
    }

    /// Appends to a specific record, whether or not it is active.
    pub fn append_message_to(&mut self, key: &str, role: Role, text: &str) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        record.messages.push(ConversationEntry {
            role,
            text: text.to_string(),
        });
        true
    }

    pub fn append_operation(&mut self, request: OperationRequest) -> Option<OperationRecord> {
        let record = self.active_mut()?;
        let entry = OperationRecord {
            timestamp: now_utc_iso(),
            operation: request,
        };
        record.operations.push(entry.clone());
        Some(entry)
    }

    /// Stores the control snapshot and cached render for the active record.
    pub fn update_render(&mut self, params: ControlParams, rendered: Option<Vec<u8>>) -> bool {
        let Some(record) = self.active_mut() else {
            return false;
        };
        record.params = params;
        record.rendered = rendered;
        true
    }

    /// Chronological "User:"/"Assistant:" transcript of the active record,
    /// followed by the applied-operations block when there is one.
    pub fn context_text(&self) -> String {
        let Some(record) = self.active() else {
            return String::new();
        };
        if record.messages.is_empty() {
            return String::new();
        }
        let mut lines: Vec<String> = record
            .messages
            .iter()
            .map(|entry| format!("{}: {}", entry.role.label(), entry.text))
            .collect();
        if !record.operations.is_empty() {
            lines.push("\n[Operations applied to this image:]".to_string());
            for op in &record.operations {
                lines.push(format!("- {}: {}", op.operation.operation, op.operation.reason));
            }
        }
        lines.join("\n")
    }

    pub fn serialize(&self) -> SessionDocument {
        let conversations = self
            .records
            .iter()
            .map(|(key, record)| {
                let doc = ConversationDocument {
                    messages: record.messages.clone(),
                    image_data: encode_optional(record.original()),
                    image_path: record.image_path.clone(),
                    cv2_operations: record.operations.clone(),
                    control_states: record.params,
                    processed_image: record.rendered.as_deref().map(|bytes| BASE64.encode(bytes)),
                };
                (key.clone(), doc)
            })
            .collect();
        SessionDocument {
            timestamp: now_utc_iso(),
            current_image: self.active.clone(),
            conversations,
        }
    }

    /// Builds a store from a document. Fails as a whole on the first bad
    /// base64 payload.
    pub fn deserialize(document: SessionDocument) -> Result<Self, PersistenceError> {
        let mut records = IndexMap::new();
        for (key, doc) in document.conversations {
            let original = match doc.image_data.as_deref() {
                Some(data) => decode_base64(&key, "image_data", data)?,
                None => Vec::new(),
            };
            let rendered = match doc.processed_image.as_deref() {
                Some(data) => Some(decode_base64(&key, "processed_image", data)?),
                None => None,
            };
            let mut record = SessionRecord::new(original, doc.image_path);
            record.params = doc.control_states;
            record.messages = doc.messages;
            record.operations = doc.cv2_operations;
            record.rendered = rendered;
            records.insert(key, record);
        }
        let active = document
            .current_image
            .filter(|key| records.contains_key(key));
        Ok(Self { records, active })
    }

    /// Replaces the whole store from a document, or leaves it untouched on error.
    pub fn restore(&mut self, document: SessionDocument) -> Result<(), PersistenceError> {
        *self = Self::deserialize(document)?;
        Ok(())
    }

    pub fn save_file(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.serialize())
            .map_err(|err| PersistenceError::Other(err.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let raw = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => PersistenceError::MissingFile(path.to_path_buf()),
            _ => PersistenceError::from(err),
        })?;
        let document: SessionDocument =
            serde_json::from_str(&raw).map_err(PersistenceError::InvalidDocument)?;
        self.restore(document)
    }

    fn active_mut(&mut self) -> Option<&mut SessionRecord> {
        let key = self.active.as_deref()?;
        self.records.get_mut(key)
    }
}

fn encode_optional(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(BASE64.encode(bytes))
    }
}

fn decode_base64(key: &str, field: &str, data: &str) -> Result<Vec<u8>, PersistenceError> {
    BASE64
        .decode(data.trim())
        .map_err(|err| PersistenceError::Other(format!("{key}: {field} is not valid base64 ({err})")))
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationStore, PersistenceError, SessionDocument};
    use crate::session::params::{Adjustment, ControlParams};
    use crate::session::record::{OperationRequest, Role};

    fn seeded_store() -> ConversationStore {
        let mut store = ConversationStore::new();
        store.set_current("a.png", vec![1, 2, 3], Some("/tmp/a.png".to_string()));
        store.append_message(Role::Assistant, "Looks dark.");
        store.append_message(Role::User, "How bright?");
        let mut params = ControlParams::default();
        params.apply(Adjustment::Brightness(30));
        store.update_render(params, Some(vec![9, 9, 9, 0]));
        store.append_operation(OperationRequest::new("sepia").with_reason("warm tone"));

        store.set_current("b.png", vec![4, 5], None);
        store.append_message(Role::Assistant, "Fine as is.");
        store
    }

    #[test]
    fn set_current_is_idempotent_for_known_keys() {
        let mut store = ConversationStore::new();
        assert!(store.set_current("a.png", vec![1], None));
        store.append_message(Role::User, "hello");
        assert!(!store.set_current("a.png", vec![2], None));
        let record = store.active().expect("active record");
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.original(), &[1]);
        assert_eq!(store.active_key(), Some("a.png"));
    }

    #[test]
    fn append_without_active_key_is_noop() {
        let mut store = ConversationStore::new();
        assert!(!store.append_message(Role::User, "hello"));
        assert!(store.append_operation(OperationRequest::new("blur")).is_none());
        assert!(store.is_empty());
        assert_eq!(store.context_text(), "");
    }

    #[test]
    fn histories_are_isolated_per_key() {
        let store = seeded_store();
        assert_eq!(store.get("a.png").map(|r| r.messages.len()), Some(2));
        assert_eq!(store.get("b.png").map(|r| r.messages.len()), Some(1));
        assert_eq!(store.image_keys(), vec!["a.png", "b.png"]);
    }

    #[test]
    fn context_text_renders_transcript_and_operations() {
        let mut store = seeded_store();
        assert!(store.switch("a.png"));
        assert_eq!(
            store.context_text(),
            "Assistant: Looks dark.\nUser: How bright?\n\n[Operations applied to this image:]\n- sepia: warm tone"
        );

        store.set_current("c.png", vec![7], None);
        assert_eq!(store.context_text(), "");
    }

    #[test]
    fn switch_to_unknown_key_keeps_active() {
        let mut store = seeded_store();
        assert!(!store.switch("missing.png"));
        assert_eq!(store.active_key(), Some("b.png"));

        assert!(store.switch("a.png"));
        let record = store.active().expect("active record");
        assert_eq!(record.params.brightness, 30);
        assert_eq!(record.rendered.as_deref(), Some(&[9, 9, 9, 0][..]));
        assert_eq!(record.original(), &[1, 2, 3]);
    }

    #[test]
    fn serialize_matches_session_file_shape() -> anyhow::Result<()> {
        let store = seeded_store();
        let value = serde_json::to_value(store.serialize())?;
        assert_eq!(value["current_image"], json!("b.png"));
        let a = &value["conversations"]["a.png"];
        assert_eq!(a["messages"][0], json!({"type": "ai", "content": "Looks dark."}));
        assert_eq!(a["image_data"], json!("AQID"));
        assert_eq!(a["image_path"], json!("/tmp/a.png"));
        assert_eq!(a["control_states"]["brightness"], json!(30));
        assert_eq!(a["cv2_operations"][0]["operation"]["operation"], json!("sepia"));
        assert!(a["cv2_operations"][0]["timestamp"].is_string());
        assert_eq!(value["conversations"]["b.png"]["processed_image"], json!(null));
        Ok(())
    }

    #[test]
    fn document_round_trip_is_lossless() -> anyhow::Result<()> {
        let store = seeded_store();
        let raw = serde_json::to_string(&store.serialize())?;
        let document: SessionDocument = serde_json::from_str(&raw)?;
        let restored = ConversationStore::deserialize(document)?;
        assert_eq!(restored, store);
        Ok(())
    }

    #[test]
    fn long_float_controls_reload_exactly() -> anyhow::Result<()> {
        let mut store = ConversationStore::new();
        store.set_current("a.png", vec![1], None);
        for step in 0..2003 {
            let mut params = ControlParams::default();
            params.apply(Adjustment::Contrast(0.5 + 2.5 * (f64::from(step) / 2003.0)));
            params.apply(Adjustment::Sharpen(3.0 * (f64::from(step) / 2011.0)));
            if step == 0 {
                params.apply(Adjustment::Contrast(0.949289975585998));
            }
            store.update_render(params, None);

            let raw = serde_json::to_string(&store.serialize())?;
            let restored = ConversationStore::deserialize(serde_json::from_str(&raw)?)?;
            let reloaded = restored.active().map(|record| record.params);
            assert_eq!(reloaded, Some(params), "step {step}");
        }
        Ok(())
    }

    #[test]
    fn lenient_documents_still_load() -> anyhow::Result<()> {
        let document: SessionDocument = serde_json::from_value(json!({
            "current_image": "a.png",
            "conversations": {
                "a.png": {
                    "messages": [
                        {"type": "ai", "content": "Looks dark."},
                        {"type": "system", "content": "note"},
                        {"type": "human", "content": "Brighter?"}
                    ]
                }
            }
        }))?;
        assert!(document.timestamp.is_empty());
        let store = ConversationStore::deserialize(document)?;
        let roles: Vec<Role> = store
            .active()
            .map(|record| record.messages.iter().map(|entry| entry.role).collect())
            .unwrap_or_default();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::User]);
        Ok(())
    }

    #[test]
    fn file_round_trip_restores_active_key() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("sessions").join("session.json");
        let mut store = seeded_store();
        store.switch("a.png");
        store.save_file(&path)?;

        let mut loaded = ConversationStore::new();
        loaded.load_file(&path)?;
        assert_eq!(loaded.active_key(), Some("a.png"));
        assert_eq!(loaded, store);
        Ok(())
    }

    #[test]
    fn dangling_current_image_is_dropped() -> anyhow::Result<()> {
        let document: SessionDocument = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00",
            "current_image": "gone.png",
            "conversations": {
                "a.png": {"messages": [], "image_data": null, "control_states": {}}
            }
        }))?;
        let store = ConversationStore::deserialize(document)?;
        assert_eq!(store.active_key(), None);
        assert_eq!(store.image_keys(), vec!["a.png"]);
        Ok(())
    }

    #[test]
    fn load_errors_are_distinct_and_leave_state_untouched() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = seeded_store();
        let before = store.clone();

        let missing = store.load_file(&temp.path().join("nope.json"));
        assert!(matches!(missing, Err(PersistenceError::MissingFile(_))));

        let invalid_path = temp.path().join("invalid.json");
        std::fs::write(&invalid_path, "{not json")?;
        let invalid = store.load_file(&invalid_path);
        assert!(matches!(invalid, Err(PersistenceError::InvalidDocument(_))));

        let bad_b64_path = temp.path().join("bad.json");
        std::fs::write(
            &bad_b64_path,
            serde_json::to_string(&json!({
                "timestamp": "t",
                "current_image": null,
                "conversations": {"x.png": {"image_data": "%%%"}}
            }))?,
        )?;
        let other = store.load_file(&bad_b64_path);
        assert!(matches!(other, Err(PersistenceError::Other(_))));

        assert_eq!(store, before);
        Ok(())
    }
}
