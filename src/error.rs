#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("validation failed: {0}")] Validation(String),
    #[error("internal error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

// Postgres SQLSTATE codes
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepoError::Conflict,
                Some(FOREIGN_KEY_VIOLATION) => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            },
            _ => RepoError::Internal(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RepoError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        RepoError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(RepoError::from(sqlx::Error::RowNotFound), RepoError::NotFound));
    }

    #[test]
    fn pool_errors_are_internal() {
        let e = RepoError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(e, RepoError::Internal(_)));
    }

    #[test]
    fn display_includes_detail() {
        assert_eq!(RepoError::Validation("title is required".into()).to_string(), "validation failed: title is required");
    }
}
