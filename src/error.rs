use thiserror::Error;

use crate::model::{EntityKind, Id};

/// Failures reported by the catalog core. Expected business conditions are
/// values of this type; callers must not reinterpret the variant.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{}", not_found_message(.kind, .id))]
    NotFound { kind: EntityKind, id: Option<Id> },
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("cannot delete {kind} {id}: it has {dependents} associated {}", dependents_noun(.kind))]
    Conflict {
        kind: EntityKind,
        id: Id,
        dependents: usize,
    },
    #[error("inconsistent entity graph: {message}")]
    Inconsistent { message: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

fn not_found_message(kind: &EntityKind, id: &Option<Id>) -> String {
    match id {
        Some(id) => format!("{} not found with id {}", kind, id),
        None => format!("{} not found", kind),
    }
}

// Genres and actors are blocked by movies; movies are blocked by actors.
fn dependents_noun(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Movie => "actors",
        EntityKind::Actor | EntityKind::Genre => "movies",
    }
}

impl CatalogError {
    pub fn not_found(kind: EntityKind, id: Id) -> Self {
        Self::NotFound { kind, id: Some(id) }
    }

    pub fn not_found_any(kind: EntityKind) -> Self {
        Self::NotFound { kind, id: None }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: Id, dependents: usize) -> Self {
        Self::Conflict {
            kind,
            id,
            dependents,
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::Validation { .. } => "validation",
            CatalogError::Conflict { .. } => "conflict",
            CatalogError::Inconsistent { .. } => "inconsistent",
            CatalogError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity() {
        let err = CatalogError::not_found(EntityKind::Genre, 7);
        assert_eq!(err.to_string(), "genre not found with id 7");

        let err = CatalogError::not_found_any(EntityKind::Actor);
        assert_eq!(err.to_string(), "actor not found");

        let err = CatalogError::conflict(EntityKind::Actor, 3, 2);
        assert_eq!(err.to_string(), "cannot delete actor 3: it has 2 associated movies");

        let err = CatalogError::conflict(EntityKind::Movie, 1, 4);
        assert_eq!(err.to_string(), "cannot delete movie 1: it has 4 associated actors");
    }

    #[test]
    fn test_storage_errors_convert_from_anyhow() {
        fn fails() -> CatalogResult<()> {
            Err(anyhow::anyhow!("connection refused"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, CatalogError::Storage(_)));
        assert_eq!(err.kind_name(), "storage");
        assert_eq!(err.to_string(), "connection refused");
    }
}
