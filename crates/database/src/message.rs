//! Message operations.
//!
//! Messages are append-only. Deletion sets a tombstone; every read in this
//! module excludes tombstoned rows. Ordering is always ascending
//! `(created_at, id)`.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, Message};

/// Input for appending a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub message_type: String,
    pub media_url: Option<String>,
    pub external_id: Option<String>,
}

impl NewMessage {
    /// A plain inbound text message from the user.
    pub fn user_text(conversation_id: &str, content: &str, external_id: Option<&str>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role: "user".to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            media_url: None,
            external_id: external_id.map(str::to_string),
        }
    }

    /// A plain assistant text reply.
    pub fn assistant_text(conversation_id: &str, content: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role: "assistant".to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            media_url: None,
            external_id: None,
        }
    }
}

/// Result of an append: the row, plus whether it already existed.
#[derive(Debug, Clone)]
pub struct Appended {
    pub message: Message,
    pub duplicate: bool,
}

/// Append a message.
///
/// Assistant and system messages are stored `read = true`, user messages
/// `read = false`. If `external_id` is set and a row with that id already
/// exists, the existing row is returned with `duplicate = true` and nothing
/// is written — this is the webhook idempotency check.
pub async fn append_message(pool: &SqlitePool, new: &NewMessage) -> Result<Appended> {
    if let Some(ext) = &new.external_id {
        if let Some(existing) = get_by_external_id(pool, ext).await? {
            return Ok(Appended {
                message: existing,
                duplicate: true,
            });
        }
    }

    let message = Message {
        id: new_id(),
        conversation_id: new.conversation_id.clone(),
        role: new.role.clone(),
        content: new.content.clone(),
        message_type: new.message_type.clone(),
        media_url: new.media_url.clone(),
        external_id: new.external_id.clone(),
        read: new.role != "user",
        deleted: false,
        delivery_failed: false,
        created_at: now_rfc3339(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO messages
            (id, conversation_id, role, content, message_type, media_url,
             external_id, read, deleted, delivery_failed, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(&message.role)
    .bind(&message.content)
    .bind(&message.message_type)
    .bind(&message.media_url)
    .bind(&message.external_id)
    .bind(message.read)
    .bind(&message.created_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Raced with another writer on the same external_id.
        let ext = new.external_id.as_deref().unwrap_or_default();
        let existing = get_by_external_id(pool, ext)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "Message",
                id: ext.to_string(),
            })?;
        return Ok(Appended {
            message: existing,
            duplicate: true,
        });
    }

    Ok(Appended {
        message,
        duplicate: false,
    })
}

/// Get a message by ID.
pub async fn get_message(pool: &SqlitePool, id: &str) -> Result<Message> {
    sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ? AND deleted = 0")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Message",
            id: id.to_string(),
        })
}

/// Get a message by its provider id, if present.
pub async fn get_by_external_id(pool: &SqlitePool, external_id: &str) -> Result<Option<Message>> {
    Ok(
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// All non-deleted messages of a conversation in `(created_at, id)` order.
pub async fn list_conversation_messages(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<Vec<Message>> {
    Ok(sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE conversation_id = ? AND deleted = 0
        ORDER BY created_at, id
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?)
}

/// The trailing window for the agent: the most recent `limit` non-system
/// messages, oldest first. System messages never appear here; the runtime
/// prepends its own preamble.
pub async fn history_window(
    pool: &SqlitePool,
    conversation_id: &str,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut recent = sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE conversation_id = ? AND deleted = 0 AND role != 'system'
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    recent.reverse();
    Ok(recent)
}

/// Mark every unread user message of a conversation read. Idempotent;
/// returns the number of rows that changed.
pub async fn mark_messages_read(pool: &SqlitePool, conversation_id: &str) -> Result<u64> {
    let result =
        sqlx::query("UPDATE messages SET read = 1 WHERE conversation_id = ? AND read = 0")
            .bind(conversation_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Flag an assistant message whose outbound delivery failed permanently.
pub async fn mark_delivery_failed(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE messages SET delivery_failed = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the provider id assigned to an outbound message once the send
/// succeeds.
pub async fn set_external_id(pool: &SqlitePool, id: &str, external_id: &str) -> Result<()> {
    sqlx::query("UPDATE messages SET external_id = ? WHERE id = ?")
        .bind(external_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Soft-delete a message. Idempotent.
pub async fn delete_message(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("UPDATE messages SET deleted = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Message",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Timestamp of the latest non-deleted user message, if any.
pub async fn latest_user_message_at(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<Option<String>> {
    Ok(sqlx::query_scalar::<_, String>(
        r#"
        SELECT created_at FROM messages
        WHERE conversation_id = ? AND role = 'user' AND deleted = 0
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::create_conversation;
    use crate::test_db;
    use crate::user::{create_user, UserInput};

    async fn seed_conversation(pool: &SqlitePool) -> String {
        let user = create_user(
            pool,
            &UserInput {
                phone: Some("+15550001111".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        create_conversation(pool, &user.id, "whatsapp", "+15550001111")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn append_sets_read_flags_by_role() {
        let db = test_db().await;
        let conv = seed_conversation(db.pool()).await;

        let inbound = append_message(db.pool(), &NewMessage::user_text(&conv, "hi", None))
            .await
            .unwrap();
        assert!(!inbound.message.read);

        let reply = append_message(db.pool(), &NewMessage::assistant_text(&conv, "hello"))
            .await
            .unwrap();
        assert!(reply.message.read);
    }

    #[tokio::test]
    async fn duplicate_external_id_is_dropped() {
        let db = test_db().await;
        let conv = seed_conversation(db.pool()).await;

        let first = append_message(
            db.pool(),
            &NewMessage::user_text(&conv, "hi", Some("msg_42")),
        )
        .await
        .unwrap();
        assert!(!first.duplicate);

        let second = append_message(
            db.pool(),
            &NewMessage::user_text(&conv, "hi", Some("msg_42")),
        )
        .await
        .unwrap();
        assert!(second.duplicate);
        assert_eq!(first.message.id, second.message.id);

        let all = list_conversation_messages(db.pool(), &conv).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn window_excludes_system_and_deleted_and_orders_ascending() {
        let db = test_db().await;
        let conv = seed_conversation(db.pool()).await;

        for i in 0..4 {
            append_message(db.pool(), &NewMessage::user_text(&conv, &format!("u{i}"), None))
                .await
                .unwrap();
        }
        let sys = append_message(
            db.pool(),
            &NewMessage {
                conversation_id: conv.clone(),
                role: "system".into(),
                content: "preamble".into(),
                message_type: "text".into(),
                media_url: None,
                external_id: None,
            },
        )
        .await
        .unwrap();

        let doomed = append_message(db.pool(), &NewMessage::user_text(&conv, "oops", None))
            .await
            .unwrap();
        delete_message(db.pool(), &doomed.message.id).await.unwrap();

        let window = history_window(db.pool(), &conv, 3).await.unwrap();
        assert_eq!(window.len(), 3);
        assert!(window.iter().all(|m| m.role != "system"));
        assert!(window.iter().all(|m| m.id != sys.message.id));
        assert_eq!(
            window.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["u1", "u2", "u3"]
        );
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let db = test_db().await;
        let conv = seed_conversation(db.pool()).await;

        append_message(db.pool(), &NewMessage::user_text(&conv, "hi", None))
            .await
            .unwrap();

        assert_eq!(mark_messages_read(db.pool(), &conv).await.unwrap(), 1);
        assert_eq!(mark_messages_read(db.pool(), &conv).await.unwrap(), 0);
    }
}
