//! Post-commit notification dispatch

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use super::model::{ListNotificationsQuery, Notification, PendingNotification, Recipients};
use super::sink::NotificationSink;
use crate::error::{ApiError, ApiResult};
use crate::models::{PaginatedResponse, PaginationParams};

/// Fans notifications out to every sink.
///
/// Services collect [`PendingNotification`]s while a transition runs and hand
/// them over only once the transaction has committed.
#[derive(Clone)]
pub struct Notifier {
    db_pool: PgPool,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new(db_pool: PgPool, sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { db_pool, sinks }
    }

    /// Best effort: every failure is logged and swallowed
    pub async fn dispatch(&self, pending: Vec<PendingNotification>) {
        for item in pending {
            let recipients = match self.resolve(&item.recipients).await {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!(kind = item.kind.as_str(), error = %e, "Could not resolve notification recipients");
                    continue;
                }
            };

            for user_id in recipients {
                let notification = item.for_user(user_id);
                for sink in &self.sinks {
                    if let Err(e) = sink.deliver(&notification).await {
                        tracing::warn!(
                            sink = sink.name(),
                            user_id = %user_id,
                            kind = %notification.kind,
                            error = %e,
                            "Notification delivery failed"
                        );
                    }
                }
            }
        }
    }

    /// Spawn delivery so the caller's response is not held up by it
    pub fn dispatch_detached(&self, pending: Vec<PendingNotification>) {
        if pending.is_empty() {
            return;
        }
        let notifier = self.clone();
        tokio::spawn(async move { notifier.dispatch(pending).await });
    }

    async fn resolve(&self, recipients: &Recipients) -> ApiResult<Vec<Uuid>> {
        match recipients {
            Recipients::User(id) => Ok(vec![*id]),
            Recipients::Roles(roles) => {
                let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
                let rows: Vec<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM users WHERE role::text = ANY($1)")
                        .bind(roles)
                        .fetch_all(&self.db_pool)
                        .await?;
                Ok(rows.into_iter().map(|(id,)| id).collect())
            }
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        query: ListNotificationsQuery,
    ) -> ApiResult<PaginatedResponse<Notification>> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR read = FALSE)",
        )
        .bind(user_id)
        .bind(query.unread_only)
        .fetch_one(&self.db_pool)
        .await?;

        let data = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(query.unread_only)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(PaginatedResponse {
            data,
            total,
            page,
            limit,
        })
    }

    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> ApiResult<Notification> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Notification {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationKind;
    use axum::async_trait;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::Mutex;

    struct RecordingSink(Mutex<Vec<Notification>>);

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
            self.0.lock().await.push(notification.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_the_others() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let recorder = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let notifier = Notifier::new(pool, vec![Arc::new(FailingSink), recorder.clone()]);

        let user = Uuid::new_v4();
        notifier
            .dispatch(vec![PendingNotification::to_user(
                user,
                NotificationKind::InvoiceSent,
                "Invoice sent",
                "FACTURE-2025-0001 was sent",
            )])
            .await;

        let delivered = recorder.0.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].user_id, user);
    }
}
