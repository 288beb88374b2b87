use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// A finalized audio capture. Only the capture component builds one, so holding a
/// `Recording` means the payload is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    id: Uuid,
    payload: Vec<u8>,
    mime_type: String,
    duration_seconds: u32,
    captured_at: OffsetDateTime,
    sha256: String,
}

impl Recording {
    pub(crate) fn finalize(
        payload: Vec<u8>,
        mime_type: &str,
        duration_seconds: u32,
        captured_at: OffsetDateTime,
    ) -> Self {
        let sha256 = hex::encode(Sha256::digest(&payload));
        Self {
            id: Uuid::new_v4(),
            payload,
            mime_type: mime_type.to_string(),
            duration_seconds,
            captured_at,
            sha256,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// `audio/wav` -> `wav`
    pub fn format(&self) -> &str {
        self.mime_type.rsplit('/').next().unwrap_or(&self.mime_type)
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    pub fn captured_at(&self) -> OffsetDateTime {
        self.captured_at
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn file_name(&self) -> String {
        format!("homework-{}.{}", self.id.simple(), self.format())
    }
}
