//! Session controller: one user session over a [`ConversationStore`].
//!
//! Control changes always re-render from the original pixels. Model calls run
//! on a background thread and report back through a single channel that the
//! owner drains with [`SessionController::poll_model`] or
//! [`SessionController::wait_model`]; the background thread never touches the
//! store. At most one call is outstanding at a time.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use image::RgbImage;
use lumen_contracts::chat::extract;
use lumen_contracts::events::EventWriter;
use lumen_contracts::session::{
    fingerprint, image_key_for, Adjustment, ControlParams, ConversationEntry, ConversationStore,
    OperationRequest, Role, SessionRecord,
};
use serde_json::json;

use crate::codec;
use crate::error::{Result, StudioError};
use crate::filters::{self, OperationOutcome};
use crate::model::{error_chain_text, ModelRequest, VisionModel};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoImage,
    Loaded,
    Edited,
}

/// Completion of a background model call, tagged with the image it was for.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Reply { key: String, text: String },
    Failed { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub key: String,
    pub created: bool,
    pub analysis_started: bool,
}

struct ActiveImage {
    key: String,
    original: RgbImage,
    bytes: Vec<u8>,
    mime: &'static str,
    derived: RgbImage,
}

struct PendingCall {
    key: String,
    receiver: Receiver<std::result::Result<String, String>>,
}

pub struct SessionController {
    model: Arc<dyn VisionModel>,
    store: ConversationStore,
    events: EventWriter,
    image: Option<ActiveImage>,
    params: ControlParams,
    state: SessionState,
    pending: Option<PendingCall>,
}

impl SessionController {
    pub fn new(model: Arc<dyn VisionModel>, events: EventWriter) -> Self {
        Self {
            model,
            store: ConversationStore::new(),
            events,
            image: None,
            params: ControlParams::default(),
            state: SessionState::NoImage,
            pending: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn active_key(&self) -> Option<&str> {
        self.image.as_ref().map(|image| image.key.as_str())
    }

    pub fn original(&self) -> Option<&RgbImage> {
        self.image.as_ref().map(|image| &image.original)
    }

    pub fn derived(&self) -> Option<&RgbImage> {
        self.image.as_ref().map(|image| &image.derived)
    }

    pub fn history(&self) -> &[ConversationEntry] {
        self.store
            .active()
            .map(|record| record.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.store.image_keys()
    }

    pub fn is_model_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn load(&mut self, path: &Path) -> Result<LoadOutcome> {
        let bytes = fs::read(path)?;
        let key = image_key_for(path);
        self.load_bytes(&key, bytes, Some(path.display().to_string()))
    }

    /// Makes `key` the active image. A new key starts at identity controls and
    /// triggers the initial analysis; a known key gets its stored controls and
    /// cached render back.
    pub fn load_bytes(
        &mut self,
        key: &str,
        bytes: Vec<u8>,
        image_path: Option<String>,
    ) -> Result<LoadOutcome> {
        let original = codec::decode(&bytes)?;

        let collided = self
            .store
            .get(key)
            .map(|record| record.fingerprint() != fingerprint(&bytes))
            .unwrap_or(false);
        if collided {
            self.events.record(
                "image_key_collision",
                json!({
                    "image_key": key,
                    "image_path": image_path,
                    "sha256": fingerprint(&bytes),
                }),
            );
        }

        let created = self
            .store
            .set_current(key, bytes.clone(), image_path.clone());
        let (params, derived) = match self.store.active() {
            Some(record) if !created => {
                let params = record.params;
                let cached = if collided { None } else { cached_render(record) };
                let derived =
                    cached.unwrap_or_else(|| filters::apply_pipeline(&original, &params));
                (params, derived)
            }
            _ => {
                let params = ControlParams::default();
                (params, filters::apply_pipeline(&original, &params))
            }
        };

        self.params = params;
        self.state = state_for(&params);
        self.image = Some(ActiveImage {
            key: key.to_string(),
            mime: codec::mime_for_bytes(&bytes),
            original,
            bytes,
            derived,
        });
        self.events.record(
            "image_loaded",
            json!({
                "image_key": key,
                "image_path": image_path,
                "created": created,
                "width": self.derived().map(RgbImage::width),
                "height": self.derived().map(RgbImage::height),
            }),
        );

        let needs_analysis = self.history().is_empty();
        let analysis_started = if needs_analysis {
            match self.analyze() {
                Ok(()) => true,
                Err(StudioError::ModelBusy) => false,
                Err(err) => return Err(err),
            }
        } else {
            false
        };

        Ok(LoadOutcome {
            key: key.to_string(),
            created,
            analysis_started,
        })
    }

    /// Applies one control change and re-renders from the original.
    pub fn adjust(&mut self, adjustment: Adjustment) -> Result<()> {
        if self.image.is_none() {
            return Err(StudioError::NoImage);
        }
        let mut params = self.params;
        params.apply(adjustment);
        self.render(params)?;
        self.state = SessionState::Edited;
        self.events.record(
            "controls_changed",
            json!({
                "image_key": self.active_key(),
                "control": adjustment.control_name(),
                "params": params,
            }),
        );
        Ok(())
    }

    pub fn toggle_flip_horizontal(&mut self) -> Result<()> {
        self.adjust(Adjustment::FlipHorizontal(!self.params.flip_horizontal))
    }

    pub fn toggle_flip_vertical(&mut self) -> Result<()> {
        self.adjust(Adjustment::FlipVertical(!self.params.flip_vertical))
    }

    pub fn reset(&mut self) -> Result<()> {
        if self.image.is_none() {
            return Err(StudioError::NoImage);
        }
        self.render(ControlParams::default())?;
        self.state = SessionState::Loaded;
        self.events
            .record("controls_reset", json!({ "image_key": self.active_key() }));
        Ok(())
    }

    fn render(&mut self, params: ControlParams) -> Result<()> {
        let Some(image) = self.image.as_mut() else {
            return Err(StudioError::NoImage);
        };
        let derived = filters::apply_pipeline(&image.original, &params);
        let encoded = codec::encode_png(&derived)?;
        image.derived = derived;
        self.params = params;
        self.store.update_render(params, Some(encoded));
        Ok(())
    }

    /// Returns `false` for an unknown key, leaving everything as it was.
    pub fn switch(&mut self, key: &str) -> Result<bool> {
        let Some(record) = self.store.get(key) else {
            return Ok(false);
        };
        let (image, params) = active_from_record(key, record)?;
        self.store.switch(key);
        self.params = params;
        self.state = state_for(&params);
        self.image = Some(image);
        self.events.record("image_switched", json!({ "image_key": key }));
        Ok(true)
    }

    /// Sends the vision prompt with the original and, once edited, the
    /// current render.
    pub fn analyze(&mut self) -> Result<()> {
        let Some(image) = self.image.as_ref() else {
            return Err(StudioError::NoImage);
        };
        if self.pending.is_some() {
            return Err(self.reject_busy("analyze"));
        }
        let request = self.attach_images(
            ModelRequest::new(prompts::vision_prompt(&self.params)),
            image,
        )?;
        let key = image.key.clone();
        self.dispatch(key, request, "analyze")
    }

    /// Records the user's message and asks the model about the active image.
    /// Rejected, with nothing recorded, while another call is outstanding.
    pub fn ask(&mut self, text: &str) -> Result<()> {
        let Some(image) = self.image.as_ref() else {
            return Err(StudioError::NoImage);
        };
        if self.pending.is_some() {
            return Err(self.reject_busy("ask"));
        }
        let key = image.key.clone();
        self.store.append_message_to(&key, Role::User, text);
        let prompt = prompts::dialog_prompt(&self.store.context_text(), text, &self.params);
        let request = match self.image.as_ref() {
            Some(image) => self.attach_images(ModelRequest::new(prompt), image)?,
            None => return Err(StudioError::NoImage),
        };
        self.dispatch(key, request, "ask")
    }

    fn attach_images(&self, request: ModelRequest, image: &ActiveImage) -> Result<ModelRequest> {
        let mut request = request.attach(None, image.mime, image.bytes.clone());
        if !self.params.is_identity() {
            request = request.attach(
                Some(prompts::EDITED_IMAGE_LABEL),
                "image/png",
                codec::encode_png(&image.derived)?,
            );
        }
        Ok(request)
    }

    fn reject_busy(&self, trigger: &str) -> StudioError {
        self.events.record(
            "model_rejected_busy",
            json!({ "trigger": trigger, "image_key": self.active_key() }),
        );
        StudioError::ModelBusy
    }

    fn dispatch(&mut self, key: String, request: ModelRequest, trigger: &str) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let model = Arc::clone(&self.model);
        let attachments = request.attachments.len();
        thread::Builder::new()
            .name("lumen-model".to_string())
            .spawn(move || {
                let outcome = model
                    .invoke(&request)
                    .map_err(|err| error_chain_text(&err, 600));
                let _ = tx.send(outcome);
            })
            .map_err(|err| StudioError::ModelInvocation(format!("model thread spawn failed: {err}")))?;

        self.events.record(
            "model_dispatched",
            json!({
                "image_key": key,
                "trigger": trigger,
                "model": self.model.name(),
                "attachments": attachments,
            }),
        );
        self.pending = Some(PendingCall { key, receiver: rx });
        Ok(())
    }

    /// Non-blocking check for a finished model call.
    pub fn poll_model(&mut self) -> Option<ModelEvent> {
        let pending = self.pending.as_ref()?;
        let outcome = match pending.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err("model task ended without a reply".to_string()),
        };
        let key = self.pending.take()?.key;
        Some(self.finish(key, outcome))
    }

    /// Blocks until the outstanding model call completes. `None` when idle.
    pub fn wait_model(&mut self) -> Option<ModelEvent> {
        let pending = self.pending.take()?;
        let outcome = pending
            .receiver
            .recv()
            .unwrap_or_else(|_| Err("model task ended without a reply".to_string()));
        Some(self.finish(pending.key, outcome))
    }

    fn finish(&mut self, key: String, outcome: std::result::Result<String, String>) -> ModelEvent {
        let outcome = outcome.and_then(|text| {
            if text.trim().is_empty() {
                Err("empty reply from model".to_string())
            } else {
                Ok(text)
            }
        });
        match outcome {
            Ok(text) => {
                self.store.append_message_to(&key, Role::Assistant, &text);
                self.events.record(
                    "model_replied",
                    json!({ "image_key": key, "chars": text.chars().count() }),
                );
                ModelEvent::Reply { key, text }
            }
            Err(message) => {
                self.events.record(
                    "model_failed",
                    json!({ "image_key": key, "error": message }),
                );
                ModelEvent::Failed { key, message }
            }
        }
    }

    /// Applies a named operation to the current render and logs it on the
    /// active record when it succeeds. The controls are not changed.
    pub fn apply_named(&mut self, request: &OperationRequest) -> Result<OperationOutcome> {
        let Some(image) = self.image.as_ref() else {
            return Err(StudioError::NoImage);
        };
        let outcome = filters::apply_named(&image.derived, request);
        if outcome.success() {
            self.store.append_operation(request.clone());
            self.events.record(
                "operation_applied",
                json!({
                    "image_key": image.key,
                    "operation": outcome.operation,
                    "params": request.params,
                    "reason": request.reason,
                }),
            );
        } else {
            self.events.record(
                "operation_failed",
                json!({
                    "image_key": image.key,
                    "operation": request.operation,
                    "error": outcome.message(),
                }),
            );
        }
        Ok(outcome)
    }

    /// Structured operation requests found in the latest assistant message.
    /// Nothing is applied.
    pub fn suggestions(&self) -> Vec<OperationRequest> {
        let latest = self
            .history()
            .iter()
            .rev()
            .find(|entry| entry.role == Role::Assistant);
        let found = latest.map(|entry| extract(&entry.text)).unwrap_or_default();
        self.events.record(
            "suggestions_extracted",
            json!({ "image_key": self.active_key(), "count": found.len() }),
        );
        found
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        let Some(derived) = self.derived() else {
            return Err(StudioError::NoImage);
        };
        codec::write_image(derived, path)
    }

    pub fn save_session(&self, path: &Path) -> Result<()> {
        self.store.save_file(path)?;
        self.events.record(
            "session_saved",
            json!({
                "path": path.display().to_string(),
                "images": self.store.image_keys().len(),
            }),
        );
        Ok(())
    }

    /// Replaces the whole session from a file. On any failure the current
    /// session is left as it was.
    pub fn restore_session(&mut self, path: &Path) -> Result<Option<String>> {
        let mut restored = ConversationStore::new();
        restored.load_file(path)?;

        let active = match restored.active_key() {
            Some(key) => match restored.get(key) {
                Some(record) => Some(active_from_record(key, record)?),
                None => None,
            },
            None => None,
        };

        self.store = restored;
        match active {
            Some((image, params)) => {
                self.params = params;
                self.state = state_for(&params);
                self.image = Some(image);
            }
            None => {
                self.params = ControlParams::default();
                self.state = SessionState::NoImage;
                self.image = None;
            }
        }
        let key = self.active_key().map(str::to_string);
        self.events.record(
            "session_restored",
            json!({
                "path": path.display().to_string(),
                "images": self.store.image_keys().len(),
                "active": key,
            }),
        );
        Ok(key)
    }
}

fn state_for(params: &ControlParams) -> SessionState {
    if params.is_identity() {
        SessionState::Loaded
    } else {
        SessionState::Edited
    }
}

fn cached_render(record: &SessionRecord) -> Option<RgbImage> {
    record
        .rendered
        .as_deref()
        .and_then(|bytes| codec::decode(bytes).ok())
}

fn active_from_record(key: &str, record: &SessionRecord) -> Result<(ActiveImage, ControlParams)> {
    let original = codec::decode(record.original())?;
    let params = record.params;
    let derived =
        cached_render(record).unwrap_or_else(|| filters::apply_pipeline(&original, &params));
    let image = ActiveImage {
        key: key.to_string(),
        original,
        bytes: record.original().to_vec(),
        mime: codec::mime_for_bytes(record.original()),
        derived,
    };
    Ok((image, params))
}
