//! Lead qualification operations.

use qualification::Step;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, LeadQualification};

/// Get a lead qualification by ID.
pub async fn get_lead(pool: &SqlitePool, id: &str) -> Result<LeadQualification> {
    sqlx::query_as::<_, LeadQualification>("SELECT * FROM lead_qualification WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "LeadQualification",
            id: id.to_string(),
        })
}

/// Get the lead qualification for a (user, conversation) pair, if present.
pub async fn get_lead_for_conversation(
    pool: &SqlitePool,
    user_id: &str,
    conversation_id: &str,
) -> Result<Option<LeadQualification>> {
    Ok(sqlx::query_as::<_, LeadQualification>(
        "SELECT * FROM lead_qualification WHERE user_id = ? AND conversation_id = ?",
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?)
}

/// Get or create the lead qualification for a (user, conversation) pair.
pub async fn get_or_create_lead(
    pool: &SqlitePool,
    user_id: &str,
    conversation_id: &str,
) -> Result<LeadQualification> {
    if let Some(existing) = get_lead_for_conversation(pool, user_id, conversation_id).await? {
        return Ok(existing);
    }

    let now = now_rfc3339();
    let lead = LeadQualification {
        id: new_id(),
        user_id: user_id.to_string(),
        conversation_id: conversation_id.to_string(),
        consent: false,
        current_step: Step::Start.as_str().to_string(),
        created_at: now.clone(),
        updated_at: now,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO lead_qualification
            (id, user_id, conversation_id, consent, current_step, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&lead.id)
    .bind(&lead.user_id)
    .bind(&lead.conversation_id)
    .bind(lead.consent)
    .bind(&lead.current_step)
    .bind(&lead.created_at)
    .bind(&lead.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return get_lead_for_conversation(pool, user_id, conversation_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "LeadQualification",
                id: conversation_id.to_string(),
            });
    }

    Ok(lead)
}

/// Record the consent flag.
pub async fn set_consent(pool: &SqlitePool, lead_id: &str, consent: bool) -> Result<()> {
    sqlx::query("UPDATE lead_qualification SET consent = ?, updated_at = ? WHERE id = ?")
        .bind(consent)
        .bind(now_rfc3339())
        .bind(lead_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist a new current step. The step name must belong to the stage graph;
/// anything else is rejected before it reaches the store.
pub async fn set_current_step(pool: &SqlitePool, lead_id: &str, step: Step) -> Result<LeadQualification> {
    let result =
        sqlx::query("UPDATE lead_qualification SET current_step = ?, updated_at = ? WHERE id = ?")
            .bind(step.as_str())
            .bind(now_rfc3339())
            .bind(lead_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "LeadQualification",
            id: lead_id.to_string(),
        });
    }
    get_lead(pool, lead_id).await
}

/// Parse and persist a step supplied as text (operator override path).
pub async fn set_current_step_str(
    pool: &SqlitePool,
    lead_id: &str,
    step: &str,
) -> Result<LeadQualification> {
    let step: Step = step
        .parse()
        .map_err(|e: qualification::UnknownStep| DatabaseError::Validation(e.to_string()))?;
    set_current_step(pool, lead_id, step).await
}

/// List all leads, newest last.
pub async fn list_leads(pool: &SqlitePool) -> Result<Vec<LeadQualification>> {
    Ok(sqlx::query_as::<_, LeadQualification>(
        "SELECT * FROM lead_qualification ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?)
}

/// Leads still in play (not completed, not abandoned) whose conversation has
/// had no user message since `cutoff`. Feeds the abandonment sweep.
pub async fn stale_leads(pool: &SqlitePool, cutoff: &str) -> Result<Vec<LeadQualification>> {
    Ok(sqlx::query_as::<_, LeadQualification>(
        r#"
        SELECT lq.* FROM lead_qualification lq
        WHERE lq.current_step NOT IN ('completed', 'abandoned')
          AND NOT EXISTS (
              SELECT 1 FROM messages m
              WHERE m.conversation_id = lq.conversation_id
                AND m.role = 'user' AND m.deleted = 0
                AND m.created_at >= ?
          )
        ORDER BY lq.created_at, lq.id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?)
}

/// Lead counts grouped by current step.
pub async fn count_by_step(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    Ok(sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT current_step, COUNT(*) as count
        FROM lead_qualification
        GROUP BY current_step
        "#,
    )
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::create_conversation;
    use crate::message::{append_message, NewMessage};
    use crate::test_db;
    use crate::user::{create_user, UserInput};

    async fn seed(pool: &SqlitePool) -> (String, String) {
        let user = create_user(
            pool,
            &UserInput {
                phone: Some("+15550001111".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let conv = create_conversation(pool, &user.id, "whatsapp", "+15550001111")
            .await
            .unwrap();
        (user.id, conv.id)
    }

    #[tokio::test]
    async fn get_or_create_is_unique_per_pair() {
        let db = test_db().await;
        let (user_id, conv_id) = seed(db.pool()).await;

        let a = get_or_create_lead(db.pool(), &user_id, &conv_id).await.unwrap();
        let b = get_or_create_lead(db.pool(), &user_id, &conv_id).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.current_step, "start");
    }

    #[tokio::test]
    async fn step_updates_are_validated() {
        let db = test_db().await;
        let (user_id, conv_id) = seed(db.pool()).await;
        let lead = get_or_create_lead(db.pool(), &user_id, &conv_id).await.unwrap();

        let updated = set_current_step_str(db.pool(), &lead.id, "bant").await.unwrap();
        assert_eq!(updated.current_step, "bant");

        let bogus = set_current_step_str(db.pool(), &lead.id, "sideways").await;
        assert!(matches!(bogus, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn stale_leads_ignores_recent_activity_and_terminals() {
        let db = test_db().await;
        let (user_id, conv_id) = seed(db.pool()).await;
        let lead = get_or_create_lead(db.pool(), &user_id, &conv_id).await.unwrap();

        // No user messages at all: stale relative to any cutoff.
        let stale = stale_leads(db.pool(), "2000-01-01T00:00:00.000Z").await.unwrap();
        assert_eq!(stale.len(), 1);

        // A fresh user message clears it.
        append_message(db.pool(), &NewMessage::user_text(&conv_id, "hi", None))
            .await
            .unwrap();
        let stale = stale_leads(db.pool(), "2000-01-01T00:00:00.000Z").await.unwrap();
        assert!(stale.is_empty());

        // Terminal steps are never swept.
        set_current_step(db.pool(), &lead.id, Step::Completed).await.unwrap();
        let stale = stale_leads(db.pool(), "9999-01-01T00:00:00.000Z").await.unwrap();
        assert!(stale.is_empty());
    }
}
