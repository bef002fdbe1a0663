//! Conversation operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, Conversation};

/// Get a conversation by ID.
pub async fn get_conversation(pool: &SqlitePool, id: &str) -> Result<Conversation> {
    sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        })
}

/// Find the single active conversation for a party, if any.
pub async fn get_active_conversation(
    pool: &SqlitePool,
    platform: &str,
    external_id: &str,
) -> Result<Option<Conversation>> {
    Ok(sqlx::query_as::<_, Conversation>(
        r#"
        SELECT * FROM conversations
        WHERE platform = ? AND external_id = ? AND status = 'active'
        "#,
    )
    .bind(platform)
    .bind(external_id)
    .fetch_optional(pool)
    .await?)
}

/// Create an active conversation for a party.
///
/// Fails with `ConstraintViolation` if the party already has one; callers
/// that want get-or-create semantics use [`get_or_create_conversation`].
pub async fn create_conversation(
    pool: &SqlitePool,
    user_id: &str,
    platform: &str,
    external_id: &str,
) -> Result<Conversation> {
    let now = now_rfc3339();
    let conversation = Conversation {
        id: new_id(),
        user_id: user_id.to_string(),
        platform: platform.to_string(),
        external_id: external_id.to_string(),
        status: "active".to_string(),
        agent_enabled: true,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO conversations
            (id, user_id, platform, external_id, status, agent_enabled, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&conversation.id)
    .bind(&conversation.user_id)
    .bind(&conversation.platform)
    .bind(&conversation.external_id)
    .bind(&conversation.status)
    .bind(conversation.agent_enabled)
    .bind(&conversation.created_at)
    .bind(&conversation.updated_at)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_unique(e, "party already has an active conversation"))?;

    Ok(conversation)
}

/// Return the party's active conversation, creating one if none exists.
pub async fn get_or_create_conversation(
    pool: &SqlitePool,
    user_id: &str,
    platform: &str,
    external_id: &str,
) -> Result<Conversation> {
    if let Some(existing) = get_active_conversation(pool, platform, external_id).await? {
        return Ok(existing);
    }
    match create_conversation(pool, user_id, platform, external_id).await {
        Ok(c) => Ok(c),
        // Lost a race with a concurrent creator; the row exists now.
        Err(DatabaseError::ConstraintViolation(_)) => {
            get_active_conversation(pool, platform, external_id)
                .await?
                .ok_or_else(|| DatabaseError::NotFound {
                    entity: "Conversation",
                    id: format!("{platform}:{external_id}"),
                })
        }
        Err(e) => Err(e),
    }
}

/// Close a conversation. Idempotent.
pub async fn close_conversation(pool: &SqlitePool, id: &str) -> Result<Conversation> {
    sqlx::query("UPDATE conversations SET status = 'closed', updated_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    get_conversation(pool, id).await
}

/// Toggle automated replies for a conversation (operator takeover).
pub async fn set_agent_enabled(pool: &SqlitePool, id: &str, enabled: bool) -> Result<Conversation> {
    let result =
        sqlx::query("UPDATE conversations SET agent_enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(now_rfc3339())
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }
    get_conversation(pool, id).await
}

/// Touch a conversation's `updated_at`.
pub async fn touch_conversation(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// List a user's conversations, optionally including closed ones.
pub async fn list_user_conversations(
    pool: &SqlitePool,
    user_id: &str,
    include_closed: bool,
) -> Result<Vec<Conversation>> {
    let sql = if include_closed {
        "SELECT * FROM conversations WHERE user_id = ? ORDER BY created_at, id"
    } else {
        "SELECT * FROM conversations WHERE user_id = ? AND status = 'active' ORDER BY created_at, id"
    };
    Ok(sqlx::query_as::<_, Conversation>(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?)
}

/// List every conversation, newest last.
pub async fn list_conversations(pool: &SqlitePool) -> Result<Vec<Conversation>> {
    Ok(
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations ORDER BY created_at, id")
            .fetch_all(pool)
            .await?,
    )
}
