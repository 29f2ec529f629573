// src/models/verification.rs

use validator::Validate;

/// A still frame drawn from the live camera preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl StillImage {
    pub fn jpeg(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            mime_type: "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    pub image: StillImage,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// Which capture capabilities were live when verification was uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFlags {
    pub camera: bool,
    pub microphone: bool,
    pub screen: bool,
}

/// Multipart body for the verification-photo endpoint.
/// The identifiers are caller-supplied and must both be present.
#[derive(Debug, Clone, Validate)]
pub struct VerificationUpload {
    #[validate(required(message = "student id is required"))]
    pub student_id: Option<i64>,
    #[validate(required(message = "exam id is required"))]
    pub exam_id: Option<i64>,
    pub photo: StillImage,
    pub id_proof: StillImage,
    pub flags: CaptureFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> StillImage {
        StillImage::jpeg(vec![1, 2, 3], 640, 480)
    }

    #[test]
    fn upload_requires_both_identifiers() {
        let upload = VerificationUpload {
            student_id: Some(1),
            exam_id: None,
            photo: image(),
            id_proof: image(),
            flags: CaptureFlags { camera: true, microphone: true, screen: false },
        };
        let errors = upload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("exam_id"));
        assert!(!errors.field_errors().contains_key("student_id"));
    }
}
