//! Delivery channels for notifications

use axum::async_trait;
use sqlx::PgPool;

use super::model::Notification;

/// One delivery channel. Failures are reported, never propagated to the
/// transition that produced the notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Persists notifications so users find them in their inbox
pub struct DatabaseSink {
    db_pool: PgPool,
}

impl DatabaseSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl NotificationSink for DatabaseSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, link, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.link)
        .bind(notification.created_at)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}
