// src/api/http.rs

use async_trait::async_trait;
use reqwest::{
    Response, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use url::Url;
use validator::Validate;

use crate::{
    api::{ExamApi, endpoints},
    config::Config,
    error::AppError,
    models::{
        question::Question,
        submission::{EvidenceBlob, EvidenceUpload, SubmissionPayload, SubmissionReceipt},
        user::{Assignment, CurrentUser, LoginRequest},
        verification::VerificationUpload,
    },
};

/// `reqwest`-backed client for the exam API.
///
/// Authentication is cookie based: the client keeps a cookie store so the
/// session established by `login` is sent with every later call.
#[derive(Clone)]
pub struct HttpExamApi {
    client: reqwest::Client,
    base_url: Url,
}

/// Response of the auto-assign endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoAssignResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    assigned_set_number: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Response of the evidence upload endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvidenceResponse {
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
}

/// Error body shape shared by the API: `{"error": ...}` or `{"message": ...}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpExamApi {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_client(client, config.api_base_url.clone()))
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // Relative joins need a trailing slash or the last path segment is dropped.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        Ok(self.base_url.join(path)?)
    }
}

/// Maps non-success statuses into the error taxonomy.
async fn check(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| format!("HTTP status {status}"));

    if status == StatusCode::UNAUTHORIZED {
        Err(AppError::AuthError(message))
    } else {
        Err(AppError::NetworkFailure(message))
    }
}

fn image_part(bytes: &[u8], file_name: &'static str, mime: &str) -> Result<Part, AppError> {
    Ok(Part::bytes(bytes.to_vec())
        .file_name(file_name)
        .mime_str(mime)?)
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn current_user(&self) -> Result<CurrentUser, AppError> {
        let response = self
            .client
            .get(self.url(endpoints::CURRENT_USER)?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn login(&self, request: &LoginRequest) -> Result<CurrentUser, AppError> {
        request.validate()?;

        let response = self
            .client
            .post(self.url(endpoints::LOGIN)?)
            .json(request)
            .send()
            .await?;
        let user: CurrentUser = check(response).await?.json().await?;
        tracing::info!("Logged in as user {}", user.user_id);
        Ok(user)
    }

    async fn logout(&self) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.url(endpoints::LOGOUT)?)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_assignment(
        &self,
        student_id: i64,
        exam_id: i64,
    ) -> Result<Option<Assignment>, AppError> {
        let response = self
            .client
            .get(self.url(endpoints::ASSIGNMENT)?)
            .query(&[
                ("userId", student_id.to_string()),
                ("examId", exam_id.to_string()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let value: serde_json::Value = check(response).await?.json().await?;
        if value.get("assignedSetNumber").is_none_or(|n| n.is_null()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value).map_err(|e| {
            AppError::NetworkFailure(format!("failed to parse assignment: {e}"))
        })?))
    }

    async fn auto_assign(&self, student_id: i64, exam_id: i64) -> Result<Assignment, AppError> {
        let response = self
            .client
            .post(self.url(endpoints::AUTO_ASSIGN)?)
            .json(&serde_json::json!({
                "userId": student_id.to_string(),
                "examId": exam_id,
            }))
            .send()
            .await?;

        let body: AutoAssignResponse = check(response).await?.json().await?;
        match (body.success, body.assigned_set_number) {
            (true, Some(set)) => Ok(Assignment {
                assigned_set_number: set,
                slot_number: None,
                has_started: None,
                has_completed: None,
            }),
            _ => Err(AppError::NetworkFailure(
                body.error
                    .unwrap_or_else(|| "Auto-assignment failed".to_string()),
            )),
        }
    }

    async fn fetch_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        let response = self
            .client
            .get(self.url(&endpoints::shuffled_questions(exam_id))?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn upload_verification(&self, upload: &VerificationUpload) -> Result<(), AppError> {
        upload.validate()?;
        let (Some(student_id), Some(exam_id)) = (upload.student_id, upload.exam_id) else {
            return Err(AppError::ValidationFailure(
                "student id and exam id are required".to_string(),
            ));
        };

        let form = Form::new()
            .part(
                "photo",
                image_part(&upload.photo.bytes, "verification.jpg", upload.photo.mime_type)?,
            )
            .part(
                "idProof",
                image_part(&upload.id_proof.bytes, "id_proof.jpg", upload.id_proof.mime_type)?,
            )
            .text("cameraEnabled", upload.flags.camera.to_string())
            .text("microphoneEnabled", upload.flags.microphone.to_string())
            .text("screenSharingEnabled", upload.flags.screen.to_string())
            .text("userId", student_id.to_string())
            .text("examId", exam_id.to_string());

        let response = self
            .client
            .post(self.url(endpoints::VERIFICATION_UPLOAD)?)
            .multipart(form)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String, AppError> {
        let video = Part::bytes(upload.blob.bytes.clone())
            .file_name(upload.file_name())
            .mime_str(EvidenceBlob::MIME_TYPE)?;

        let form = Form::new()
            .part("video", video)
            .text("examId", upload.key.exam_id.to_string())
            .text("studentId", upload.key.student_id.to_string());

        let response = self
            .client
            .post(self.url(endpoints::EVIDENCE_UPLOAD)?)
            .multipart(form)
            .send()
            .await?;

        let body: EvidenceResponse = check(response).await?.json().await?;
        body.video_url.or(body.file_path).ok_or_else(|| {
            AppError::NetworkFailure("evidence upload returned no reference".to_string())
        })
    }

    async fn submit_exam(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, AppError> {
        let response = self
            .client
            .post(self.url(endpoints::SUBMIT_EXAM)?)
            .json(payload)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_path_prefix() {
        let api = HttpExamApi::with_client(
            reqwest::Client::new(),
            Url::parse("http://exam.local/portal").unwrap(),
        );
        let url = api.url(endpoints::SUBMIT_EXAM).unwrap();
        assert_eq!(url.as_str(), "http://exam.local/portal/api/candidate/submit-exam");
    }

    #[test]
    fn question_path_embeds_exam_id() {
        assert_eq!(
            endpoints::shuffled_questions(11),
            "api/candidate/exams/11/shuffled-questions"
        );
    }
}
