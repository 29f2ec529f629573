// src/models/user.rs

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// The authenticated candidate, as reported by the session-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// The server stores the id in the HTTP session as a string,
    /// so it may come back either as a number or as a string.
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl CurrentUser {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Candidate")
    }
}

/// DTO for candidate login.
#[derive(Debug, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

/// Question-set variant the server assigned to a candidate for an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub assigned_set_number: i64,
    #[serde(default)]
    pub slot_number: Option<i64>,
    #[serde(default)]
    pub has_started: Option<bool>,
    #[serde(default)]
    pub has_completed: Option<bool>,
}

/// Accepts `7` as well as `"7"`.
pub(crate) fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(id) => Ok(id),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_user_accepts_string_id() {
        let user: CurrentUser =
            serde_json::from_str(r#"{"userId":"42","email":"a@b.c","name":"Asha"}"#).unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(user.display_name(), "Asha");
    }

    #[test]
    fn current_user_accepts_numeric_id() {
        let user: CurrentUser = serde_json::from_str(r#"{"userId":7}"#).unwrap();
        assert_eq!(user.user_id, 7);
        assert_eq!(user.display_name(), "Candidate");
    }

    #[test]
    fn login_requires_email_and_password() {
        let req = LoginRequest {
            email: "not-an-email".to_string(),
            password: String::new(),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
    }
}
