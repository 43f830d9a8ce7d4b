mod error;
mod params;
mod record;
mod store;

pub use error::PersistenceError;
pub use params::{
    Adjustment, ControlParams, BLUR_RANGE, BRIGHTNESS_RANGE, CONTRAST_RANGE, ROTATION_RANGE,
    SHARPEN_RANGE,
};
pub use record::{
    fingerprint, image_key_for, ConversationEntry, OperationRecord, OperationRequest, Role,
    SessionRecord,
};
pub use store::{ConversationDocument, ConversationStore, SessionDocument};
