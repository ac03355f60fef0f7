use thiserror::Error;

/// Domain failures that callers are expected to handle or present.
///
/// These are the "client side" errors of the library: retrying them never
/// helps, so [`crate::retry`] gives up on them immediately. Everything else
/// travels as a plain `anyhow::Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} named '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{entity} {id} belongs to another user")]
    Forbidden { entity: &'static str, id: String },
}

impl LibraryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, name: impl Into<String>) -> Self {
        LibraryError::Duplicate {
            entity,
            name: name.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LibraryError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn forbidden(entity: &'static str, id: impl ToString) -> Self {
        LibraryError::Forbidden {
            entity,
            id: id.to_string(),
        }
    }
}

/// True when `err` (or anything in its chain) is a [`LibraryError::NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<LibraryError>(),
            Some(LibraryError::NotFound { .. })
        )
    })
}
