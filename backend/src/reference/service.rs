//! Atomic reference allocation

use std::future::Future;

use chrono::{Datelike, Utc};
use sqlx::PgPool;

use super::model::{format_reference, ReferenceFamily};
use crate::error::{ApiError, ApiResult};

/// Hands out `<PREFIX>-<year>-<seq>` references from per-(family, year)
/// counter rows.
///
/// The increment runs on its own pooled connection and commits immediately,
/// independently of the caller's transaction. A rolled back business
/// transaction therefore leaves a gap, and a retried one always draws a
/// fresh number.
#[derive(Clone)]
pub struct ReferenceGenerator {
    db_pool: PgPool,
    retry_budget: u32,
}

impl ReferenceGenerator {
    pub fn new(db_pool: PgPool, retry_budget: u32) -> Self {
        Self {
            db_pool,
            retry_budget: retry_budget.max(1),
        }
    }

    /// Next reference of `family` for `year`
    pub async fn next_reference(&self, family: ReferenceFamily, year: i32) -> ApiResult<String> {
        let (last_number,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO reference_counters (family, year, last_number, updated_at)
            VALUES ($1, $2, 1, NOW())
            ON CONFLICT (family, year)
            DO UPDATE SET last_number = reference_counters.last_number + 1, updated_at = NOW()
            RETURNING last_number
            "#,
        )
        .bind(family.as_str())
        .bind(year)
        .fetch_one(&self.db_pool)
        .await?;

        let reference = format_reference(family, year, last_number);
        tracing::debug!(family = family.prefix(), year, reference = %reference, "Reference allocated");
        Ok(reference)
    }

    /// Next reference of `family` for the current calendar year
    pub async fn next_for_current_year(&self, family: ReferenceFamily) -> ApiResult<String> {
        self.next_reference(family, current_year()).await
    }

    /// Run a whole transactional operation, re-running it when it lost a
    /// reference race
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        retry_on_duplicate(self.retry_budget, operation, op).await
    }
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Re-run `op` while it fails with [`ApiError::DuplicateReference`], at most
/// `budget` attempts in total, then give up with a conflict.
pub async fn retry_on_duplicate<T, F, Fut>(budget: u32, operation: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let budget = budget.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Err(ApiError::DuplicateReference(detail)) if attempt < budget => {
                tracing::warn!(operation, attempt, detail = %detail, "Duplicate reference, retrying");
            }
            Err(ApiError::DuplicateReference(detail)) => {
                tracing::error!(operation, attempt, detail = %detail, "Reference retry budget exhausted");
                return Err(ApiError::Conflict(format!(
                    "Could not allocate a unique reference for {} after {} attempts",
                    operation, attempt
                )));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_duplicates() {
        let calls = AtomicU32::new(0);
        let result = retry_on_duplicate(3, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::DuplicateReference("COL-2025-0001".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_is_conflict() {
        let calls = AtomicU32::new(0);
        let result: ApiResult<()> = retry_on_duplicate(3, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::DuplicateReference("FACTURE-2025-0002".into())) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ApiResult<()> = retry_on_duplicate(5, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::state_conflict("already validated", "VALIDEE")) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::StateConflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_still_runs_once() {
        let result = retry_on_duplicate(0, "test", || async { Ok::<_, ApiError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
