use crate::ipc::error::err;
use serde_json::{json, Value};
use thiserror::Error;

/// Request-level failures. Row-level validation problems never use this type;
/// they travel as data inside a preview.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    BadParams(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<Value>,
    },

    #[error("record failed validation: {}", .issues.join("; "))]
    Invalid { issues: Vec<String> },

    #[error("{0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict_with(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Invalid { .. } => "validation_failed",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::Database(_) => "db_error",
            Self::Io(_) => "io_error",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::Conflict { details, .. } => details.clone(),
            Self::Invalid { issues } => Some(json!({ "issues": issues })),
            _ => None,
        }
    }

    pub fn response(self, id: &str) -> Value {
        let details = self.details();
        err(id, self.code(), self.to_string(), details)
    }
}

/// True when the statement was rejected by a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Maps a unique violation to a conflict, leaving every other error untouched.
pub fn conflict_on_unique(e: rusqlite::Error, message: impl Into<String>) -> AdminError {
    if is_unique_violation(&e) {
        AdminError::conflict(message)
    } else {
        AdminError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_is_detected_and_mapped_to_conflict() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE t(name TEXT UNIQUE)", [])
            .expect("create");
        conn.execute("INSERT INTO t(name) VALUES('a')", [])
            .expect("insert");
        let e = conn
            .execute("INSERT INTO t(name) VALUES('a')", [])
            .expect_err("duplicate");
        assert!(is_unique_violation(&e));
        let mapped = conflict_on_unique(e, "name taken");
        assert_eq!(mapped.code(), "conflict");
        assert_eq!(mapped.to_string(), "name taken");
    }

    #[test]
    fn response_carries_code_and_details() {
        let resp = AdminError::not_found("course", "c1").response("7");
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["id"], "7");
        assert_eq!(resp["error"]["code"], "not_found");
        assert_eq!(resp["error"]["details"]["entity"], "course");
    }
}
