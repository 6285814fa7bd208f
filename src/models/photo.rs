//! Attendance photo capture.
//!
//! A photo taken while recording attendance travels inside the attendance
//! payload as base64 text, so it goes through the same create/update path
//! (and the same offline replica) as the rest of the record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use thiserror::Error;

pub const PHOTO_FIELD: &str = "foto";
pub const PHOTO_MIME_FIELD: &str = "fotoMime";

const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Photo is empty")]
    Empty,

    #[error("Unsupported photo format: {0}")]
    UnsupportedMime(String),

    #[error("Attendance payload is not a JSON object")]
    PayloadNotObject,

    #[error("Photo is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendancePhoto {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AttendancePhoto {
    pub fn new(mime: &str, bytes: Vec<u8>) -> Result<Self, PhotoError> {
        if bytes.is_empty() {
            return Err(PhotoError::Empty);
        }
        if !ACCEPTED_MIME_TYPES.contains(&mime) {
            return Err(PhotoError::UnsupportedMime(mime.to_string()));
        }
        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Write the photo into an attendance payload, replacing any previous one.
    pub fn attach(&self, payload: &mut Value) -> Result<(), PhotoError> {
        let object = payload.as_object_mut().ok_or(PhotoError::PayloadNotObject)?;
        object.insert(PHOTO_FIELD.into(), Value::String(STANDARD.encode(&self.bytes)));
        object.insert(PHOTO_MIME_FIELD.into(), Value::String(self.mime.clone()));
        Ok(())
    }

    /// Read a photo back out of an attendance payload. `Ok(None)` when the
    /// record has no photo.
    pub fn from_payload(payload: &Value) -> Result<Option<Self>, PhotoError> {
        let Some(encoded) = payload.get(PHOTO_FIELD).and_then(Value::as_str) else {
            return Ok(None);
        };
        let mime = payload
            .get(PHOTO_MIME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("image/jpeg");
        let bytes = STANDARD.decode(encoded)?;
        Self::new(mime, bytes).map(Some)
    }
}
