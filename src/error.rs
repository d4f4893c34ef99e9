use anyhow::anyhow;
use serde::Serialize;

use crate::models::TicketId;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    InvalidInput,
    NotFound,
    Unknown,
}

/// Structured payload attached to errors that reference specific tickets,
/// so the gateway can tell callers which id broke the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDetails {
    #[serde(rename_all = "camelCase")]
    CycleDetected {
        child_id: TicketId,
        parent_id: TicketId,
    },
    #[serde(rename_all = "camelCase")]
    PartialFailure { offending_id: TicketId },
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub details: Option<ErrorDetails>,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            details: None,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            details: None,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            details: None,
            source,
        }
    }

    pub fn invalid_with_details(
        code: &'static str,
        public: &'static str,
        details: ErrorDetails,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            details: Some(details),
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            details: None,
            source,
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            details: None,
            source,
        }
    }

    pub fn message(public: &'static str) -> Self {
        Self::unknown(public, anyhow!(public))
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::database("Database request failed", anyhow!(value))
    }
}
