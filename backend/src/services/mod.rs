//! Business logic services for the Almox server

pub mod item;
pub mod manifest;
pub mod requisition;
pub mod warehouse;

pub use item::ItemService;
pub use requisition::RequisitionService;
pub use warehouse::WarehouseService;

use std::future::Future;

use crate::error::{is_transient, AppResult};

/// Run `op` again when it fails with a serialization failure or deadlock.
///
/// `op` must open and commit its own transaction so that every attempt
/// starts from a clean snapshot.
pub async fn with_transition_retry<T, F, Fut>(attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if attempt < attempts && is_transient(&e) => {
                tracing::warn!(attempt, error = %e, "transient database error, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_transition_retry(3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("Requisition".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Database error carrying a Postgres SQLSTATE
    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct CodedDbError {
        code: &'static str,
        message: String,
    }

    impl sqlx::error::DatabaseError for CodedDbError {
        fn message(&self) -> &str {
            &self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> AppError {
        AppError::DatabaseError(sqlx::Error::Database(Box::new(CodedDbError {
            code,
            message: format!("sqlstate {}", code),
        })))
    }

    #[tokio::test]
    async fn test_serialization_failure_is_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_transition_retry(3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(db_error("40001"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadlock_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_transition_retry(2, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(db_error("40P01"))
        })
        .await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_database_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_transition_retry(3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(db_error("23505"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_returns_first_value() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_transition_retry(0, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
