//! BANT data operations.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{new_id, now_rfc3339, BantData};

/// Fields to record. `None` leaves the stored value untouched, so repeating
/// a subset of already-set answers is a no-op.
#[derive(Debug, Clone, Default)]
pub struct BantPatch {
    pub budget: Option<String>,
    pub authority: Option<String>,
    pub need: Option<String>,
    pub timeline: Option<String>,
}

impl BantPatch {
    fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.authority.is_none()
            && self.need.is_none()
            && self.timeline.is_none()
    }
}

/// Get the BANT row for a lead, if present.
pub async fn get_bant(pool: &SqlitePool, lead_id: &str) -> Result<Option<BantData>> {
    Ok(sqlx::query_as::<_, BantData>(
        "SELECT * FROM bant_data WHERE lead_qualification_id = ?",
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?)
}

/// Record BANT answers for a lead, creating the row on first write.
///
/// Only fields that are currently unset (NULL or empty) are overwritten;
/// a lead's first answer wins and re-sends are no-ops.
pub async fn record_bant(pool: &SqlitePool, lead_id: &str, patch: &BantPatch) -> Result<BantData> {
    let existing = get_bant(pool, lead_id).await?;

    match existing {
        None => {
            let bant = BantData {
                id: new_id(),
                lead_qualification_id: lead_id.to_string(),
                budget: patch.budget.clone(),
                authority: patch.authority.clone(),
                need: patch.need.clone(),
                timeline: patch.timeline.clone(),
                updated_at: now_rfc3339(),
            };
            sqlx::query(
                r#"
                INSERT INTO bant_data
                    (id, lead_qualification_id, budget, authority, need, timeline, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bant.id)
            .bind(&bant.lead_qualification_id)
            .bind(&bant.budget)
            .bind(&bant.authority)
            .bind(&bant.need)
            .bind(&bant.timeline)
            .bind(&bant.updated_at)
            .execute(pool)
            .await?;
            Ok(bant)
        }
        Some(current) => {
            if patch.is_empty() {
                return Ok(current);
            }
            sqlx::query(
                r#"
                UPDATE bant_data
                SET budget   = CASE WHEN budget   IS NULL OR budget   = '' THEN COALESCE(?, budget)   ELSE budget   END,
                    authority = CASE WHEN authority IS NULL OR authority = '' THEN COALESCE(?, authority) ELSE authority END,
                    need     = CASE WHEN need     IS NULL OR need     = '' THEN COALESCE(?, need)     ELSE need     END,
                    timeline = CASE WHEN timeline IS NULL OR timeline = '' THEN COALESCE(?, timeline) ELSE timeline END,
                    updated_at = ?
                WHERE lead_qualification_id = ?
                "#,
            )
            .bind(&patch.budget)
            .bind(&patch.authority)
            .bind(&patch.need)
            .bind(&patch.timeline)
            .bind(now_rfc3339())
            .bind(lead_id)
            .execute(pool)
            .await?;

            Ok(get_bant(pool, lead_id).await?.unwrap_or(current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::create_conversation;
    use crate::lead::get_or_create_lead;
    use crate::test_db;
    use crate::user::{create_user, UserInput};

    async fn seed_lead(pool: &SqlitePool) -> String {
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
        get_or_create_lead(pool, &user.id, &conv.id).await.unwrap().id
    }

    #[tokio::test]
    async fn fields_accumulate_across_turns() {
        let db = test_db().await;
        let lead_id = seed_lead(db.pool()).await;

        let after_budget = record_bant(
            db.pool(),
            &lead_id,
            &BantPatch {
                budget: Some("20k".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!after_budget.is_complete());

        let full = record_bant(
            db.pool(),
            &lead_id,
            &BantPatch {
                authority: Some("I decide".into()),
                need: Some("automation".into()),
                timeline: Some("Q3".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(full.is_complete());
        assert_eq!(full.budget.as_deref(), Some("20k"));
    }

    #[tokio::test]
    async fn resending_set_fields_is_a_noop() {
        let db = test_db().await;
        let lead_id = seed_lead(db.pool()).await;

        record_bant(
            db.pool(),
            &lead_id,
            &BantPatch {
                budget: Some("20k".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let after = record_bant(
            db.pool(),
            &lead_id,
            &BantPatch {
                budget: Some("50k".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(after.budget.as_deref(), Some("20k"));
    }
}
