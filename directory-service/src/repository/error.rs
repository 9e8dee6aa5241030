use crate::dn::DnError;
use crate::mapper::MapperError;
use service_core::error::AppError;
use thiserror::Error;

/// Outcome taxonomy of the write path. Driver error codes never escape this
/// layer as control-flow signals.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entry already exists")]
    AlreadyExists,

    #[error("No such object")]
    NoSuchObject,

    #[error("Invalid DN syntax")]
    InvalidDnSyntax,

    #[error("Directory store unavailable: {0}")]
    Unavailable(anyhow::Error),

    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl RepositoryError {
    /// Wrap a storage failure with the operation that produced it.
    pub(crate) fn storage(operation: String, err: sqlx::Error) -> Self {
        RepositoryError::Internal(anyhow::Error::new(err).context(operation))
    }

    /// Like [`RepositoryError::storage`], but a duplicate-key violation from
    /// a conditional insert means the caller lost the race.
    pub(crate) fn from_insert(operation: String, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                tracing::debug!(operation = %operation, "Unique violation on insert");
                RepositoryError::AlreadyExists
            }
            err => Self::storage(operation, err),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::AlreadyExists => "already_exists",
            RepositoryError::NoSuchObject => "no_such_object",
            RepositoryError::InvalidDnSyntax => "invalid_dn_syntax",
            RepositoryError::Unavailable(_) => "unavailable",
            RepositoryError::Internal(_) => "internal",
        }
    }
}

impl From<DnError> for RepositoryError {
    fn from(err: DnError) -> Self {
        tracing::info!(error = %err, "Rejecting DN");
        RepositoryError::InvalidDnSyntax
    }
}

impl From<MapperError> for RepositoryError {
    fn from(err: MapperError) -> Self {
        RepositoryError::Internal(anyhow::Error::new(err).context("map entry to storage row"))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::AlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("Entry already exists"))
            }
            RepositoryError::NoSuchObject => AppError::NotFound(anyhow::anyhow!("No such object")),
            RepositoryError::InvalidDnSyntax => {
                AppError::BadRequest(anyhow::anyhow!("Invalid DN syntax"))
            }
            RepositoryError::Unavailable(e) => {
                tracing::error!(error = %e, "Directory store unavailable");
                AppError::ServiceUnavailable
            }
            RepositoryError::Internal(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_errors_become_invalid_syntax() {
        let err: RepositoryError = DnError::InvalidSyntax("cn".to_string()).into();
        assert!(matches!(err, RepositoryError::InvalidDnSyntax));
        let err: RepositoryError = DnError::OutsideSuffix("dc=org".to_string()).into();
        assert!(matches!(err, RepositoryError::InvalidDnSyntax));
    }

    #[test]
    fn non_unique_errors_stay_internal() {
        let err =
            RepositoryError::from_insert("insert entry".to_string(), sqlx::Error::RowNotFound);
        assert!(matches!(err, RepositoryError::Internal(_)));
        assert!(err.to_string().contains("insert entry"));
    }

    #[test]
    fn maps_onto_app_errors() {
        assert!(matches!(
            AppError::from(RepositoryError::AlreadyExists),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::NoSuchObject),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::InvalidDnSyntax),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Unavailable(anyhow::anyhow!("commit failed"))),
            AppError::ServiceUnavailable
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Internal(anyhow::anyhow!("boom"))),
            AppError::DatabaseError(_)
        ));
    }

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(RepositoryError::AlreadyExists.kind(), "already_exists");
        assert_eq!(RepositoryError::InvalidDnSyntax.kind(), "invalid_dn_syntax");
    }
}
