//! Tool history persistence.
//!
//! Every tool invocation the orchestrator applies leaves a row here, success
//! or failure; the dashboard derives the tool-call success rate from it.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{new_id, now_rfc3339, ToolHistoryEntry};

/// Record a tool invocation outcome.
pub async fn insert_tool_history(
    pool: &SqlitePool,
    conversation_id: &str,
    lead_qualification_id: Option<&str>,
    tool_name: &str,
    success: bool,
    error: Option<&str>,
) -> Result<ToolHistoryEntry> {
    let entry = ToolHistoryEntry {
        id: new_id(),
        conversation_id: conversation_id.to_string(),
        lead_qualification_id: lead_qualification_id.map(str::to_string),
        tool_name: tool_name.to_string(),
        success,
        error: error.map(str::to_string),
        created_at: now_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO tool_history
            (id, conversation_id, lead_qualification_id, tool_name, success, error, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.conversation_id)
    .bind(&entry.lead_qualification_id)
    .bind(&entry.tool_name)
    .bind(entry.success)
    .bind(&entry.error)
    .bind(&entry.created_at)
    .execute(pool)
    .await?;

    Ok(entry)
}

/// Recent tool history for a conversation, newest first.
pub async fn list_tool_history(
    pool: &SqlitePool,
    conversation_id: &str,
    limit: i64,
) -> Result<Vec<ToolHistoryEntry>> {
    Ok(sqlx::query_as::<_, ToolHistoryEntry>(
        r#"
        SELECT * FROM tool_history
        WHERE conversation_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// `(total, succeeded)` tool invocations recorded since an RFC3339 instant.
pub async fn counts_since(pool: &SqlitePool, since: &str) -> Result<(i64, i64)> {
    let row = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT COUNT(*), COALESCE(SUM(success), 0)
        FROM tool_history
        WHERE created_at >= ?
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Drop entries older than the cutoff. Returns how many were removed.
pub async fn prune_older_than(pool: &SqlitePool, cutoff: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tool_history WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::upsert_user_and_open_conversation;
    use crate::test_db;

    #[tokio::test]
    async fn records_and_counts_outcomes() {
        let db = test_db().await;
        let (_, conv, lead) =
            upsert_user_and_open_conversation(db.pool(), "whatsapp", "+15550001111")
                .await
                .unwrap();

        insert_tool_history(db.pool(), &conv.id, Some(&lead.id), "record_bant", true, None)
            .await
            .unwrap();
        insert_tool_history(
            db.pool(),
            &conv.id,
            Some(&lead.id),
            "schedule_meeting",
            false,
            Some("calendar unavailable"),
        )
        .await
        .unwrap();

        let (total, succeeded) = counts_since(db.pool(), "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(succeeded, 1);

        let history = list_tool_history(db.pool(), &conv.id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tool_name, "schedule_meeting");
        assert!(!history[0].success);
    }

    #[tokio::test]
    async fn prune_removes_old_entries() {
        let db = test_db().await;
        let (_, conv, _) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+1555")
            .await
            .unwrap();

        insert_tool_history(db.pool(), &conv.id, None, "record_consent", true, None)
            .await
            .unwrap();

        let removed = prune_older_than(db.pool(), "9999-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let (total, _) = counts_since(db.pool(), "2000-01-01T00:00:00.000Z").await.unwrap();
        assert_eq!(total, 0);
    }
}
