use calrestore_core::error::CoreError;
use thiserror::Error;

/// Errors raised by a [`crate::sink::RestoreSink`].
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Duplicate calendar: {0}")]
    DuplicateCalendar(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Restore engine errors.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    CoreError(#[from] CoreError),

    #[error(transparent)]
    SinkError(#[from] SinkError),

    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("Encoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown entity reference &{0};")]
    UnknownEntity(String),

    #[error("Unknown tag {tag} for {entity}")]
    UnknownTag { entity: &'static str, tag: String },

    #[error("Duplicate key {key} in {table} table")]
    DuplicateKey { table: &'static str, key: String },

    #[error("Missing {kind} {key}")]
    MissingReference { kind: &'static str, key: String },

    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No value for {0}")]
    MissingValue(String),

    #[error("Parse stack mismatch: expected {expected}, found {found}")]
    StackMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid rule pattern {0}")]
    InvalidPattern(String),

    #[error("Field table for {entity}: {reason}")]
    FieldTable { entity: &'static str, reason: String },

    #[error("Restore aborted: {0}")]
    Aborted(String),
}

impl RestoreError {
    /// ## Summary
    /// Entity-level errors are recorded against the entity being built and
    /// the run continues. Everything else unwinds the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MissingReference { .. } | Self::InvalidValue { .. } | Self::MissingValue(_)
        )
    }

    pub(crate) fn missing(kind: &'static str, key: impl ToString) -> Self {
        Self::MissingReference {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.to_owned(),
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type RestoreResult<T> = std::result::Result<T, RestoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_level_errors_are_not_fatal() {
        assert!(!RestoreError::missing("owner", "/principals/users/x").is_fatal());
        assert!(!RestoreError::MissingValue("uid".into()).is_fatal());
        assert!(
            RestoreError::UnknownTag {
                entity: "event",
                tag: "foobar".into()
            }
            .is_fatal()
        );
        assert!(
            RestoreError::DuplicateKey {
                table: "users",
                key: "1".into()
            }
            .is_fatal()
        );
        assert!(RestoreError::from(SinkError::Storage("disk".into())).is_fatal());
    }
}
