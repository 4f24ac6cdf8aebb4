use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether this violation hit one of the trial abuse-prevention indexes.
    pub fn is_trial_conflict(&self) -> bool {
        match self {
            DbError::UniqueViolation {
                constraint: Some(constraint),
                ..
            } => constraint.starts_with("vpn_provisions_trial_"),
            _ => false,
        }
    }
}

/// Convert from sqlx::Error using sqlx's error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_conflict_detection() {
        let err = DbError::UniqueViolation {
            constraint: Some("vpn_provisions_trial_device_uniq".to_string()),
            table: Some("vpn_provisions".to_string()),
            message: "duplicate key".to_string(),
        };
        assert!(err.is_trial_conflict());

        let err = DbError::UniqueViolation {
            constraint: Some("vpn_provisions_user_current_uniq".to_string()),
            table: Some("vpn_provisions".to_string()),
            message: "duplicate key".to_string(),
        };
        assert!(!err.is_trial_conflict());

        assert!(!DbError::NotFound.is_trial_conflict());
    }
}
