// src/utils/notify.rs

use sqlx::PgPool;

/// Notification Emitter.
///
/// Fire-and-forget inserts into the `notifications` table. A failed insert is
/// logged and swallowed: notification delivery must never fail the operation
/// that triggered it.
pub async fn notify(
    pool: &PgPool,
    user_id: i64,
    kind: &str,
    title: &str,
    content: &str,
    related_id: Option<i64>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, content, related_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(content)
    .bind(related_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!("Failed to insert notification for user {}: {:?}", user_id, e);
    }
}

/// Emits the same notification to a batch of users.
pub async fn notify_many(
    pool: &PgPool,
    user_ids: &[i64],
    kind: &str,
    title: &str,
    content: &str,
    related_id: Option<i64>,
) {
    if user_ids.is_empty() {
        return;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, content, related_id)
        SELECT uid, $2, $3, $4, $5 FROM UNNEST($1::BIGINT[]) AS uid
        "#,
    )
    .bind(user_ids)
    .bind(kind)
    .bind(title)
    .bind(content)
    .bind(related_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(
            "Failed to insert {} notifications ({}): {:?}",
            user_ids.len(),
            kind,
            e
        );
    }
}
