/// Errors surfaced by the storage layer.
///
/// Constraint violations carry the Postgres constraint name so the
/// orchestration layer can log row identity and decide whether to
/// continue. The store itself never retries; transient failures are
/// classified so the caller can choose to re-run the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("constraint violation ({constraint}): {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("transient storage error: {0}")]
    Transient(sqlx::Error),

    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
}

// Postgres class 23 (integrity constraint violation) codes we classify:
// 23503 foreign key, 23505 unique, 23514 check.
const CONSTRAINT_CODES: [&str; 3] = ["23503", "23505", "23514"];

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                if code
                    .as_deref()
                    .is_some_and(|c| CONSTRAINT_CODES.contains(&c))
                {
                    return DbError::ConstraintViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                        message: db_err.message().to_string(),
                    };
                }
                DbError::Sqlx(err)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::Transient(err)
            }
            _ => DbError::Sqlx(err),
        }
    }
}

impl DbError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation { .. })
    }
}
