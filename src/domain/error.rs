use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-scoped validation failure reported by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub messages: Vec<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            messages: vec![message.into()],
        }
    }

    /// First message for this field, if any.
    pub fn first_message(&self) -> Option<&str> {
        self.messages.first().map(String::as_str)
    }
}

/// Failure of a remote procedure, one variant per error kind.
///
/// Read entries carry this value as their error state, and hydration snapshots
/// transport it, so the union is serializable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcedureError {
    #[error("{entity} not found")]
    NotFound { entity: String },
    #[error("validation failed for {} field(s)", fields.len())]
    Validation { fields: Vec<ValidationError> },
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("authentication required")]
    AuthRequired,
}

impl ProcedureError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn validation(fields: Vec<ValidationError>) -> Self {
        Self::Validation { fields }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::Transport { .. } => "transport",
            Self::AuthRequired => "auth_required",
        }
    }

    /// Whether a later subscription may retry the failed read.
    ///
    /// Only transport failures are transient; a missing entity stays missing
    /// for the lifetime of the page.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The first message of the first failing field of a validation error.
    pub fn first_field_message(&self) -> Option<(&str, &str)> {
        match self {
            Self::Validation { fields } => fields
                .iter()
                .find_map(|field| field.first_message().map(|msg| (field.field.as_str(), msg))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let err = ProcedureError::not_found("profile");
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["entity"], "profile");

        let back: ProcedureError = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, err);
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ProcedureError::transport("offline").is_retryable());
        assert!(!ProcedureError::not_found("profile").is_retryable());
        assert!(!ProcedureError::AuthRequired.is_retryable());
        assert!(!ProcedureError::validation(Vec::new()).is_retryable());
    }

    #[test]
    fn first_field_message_skips_fields_without_messages() {
        let err = ProcedureError::validation(vec![
            ValidationError {
                field: "title".to_string(),
                messages: Vec::new(),
            },
            ValidationError {
                field: "content".to_string(),
                messages: vec!["Content cannot be empty".to_string(), "second".to_string()],
            },
        ]);

        assert_eq!(
            err.first_field_message(),
            Some(("content", "Content cannot be empty"))
        );
        assert_eq!(ProcedureError::AuthRequired.first_field_message(), None);
    }
}
