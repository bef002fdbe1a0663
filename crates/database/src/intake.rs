//! Transactional intake helpers.
//!
//! The webhook path resolves a party to (user, conversation, lead) in one
//! atomic step so a crash between the three writes cannot leave a dangling
//! half-registered party.

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, Conversation, LeadQualification, User};

/// Resolve or create the user, active conversation, and lead qualification
/// for an inbound party, atomically.
///
/// The party key is the platform `external_id`; for WhatsApp it doubles as
/// the user's phone number.
pub async fn upsert_user_and_open_conversation(
    pool: &SqlitePool,
    platform: &str,
    external_id: &str,
) -> Result<(User, Conversation, LeadQualification)> {
    if external_id.trim().is_empty() {
        return Err(DatabaseError::Validation("empty party identifier".into()));
    }

    let mut tx: Transaction<'_, Sqlite> = pool.begin().await?;
    let now = now_rfc3339();

    // User, keyed by phone for messaging platforms.
    let user = match sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = ?")
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?
    {
        Some(user) => user,
        None => {
            let user = User {
                id: new_id(),
                phone: Some(external_id.to_string()),
                email: None,
                full_name: String::new(),
                company: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            sqlx::query(
                r#"
                INSERT INTO users (id, phone, email, full_name, company, created_at, updated_at)
                VALUES (?, ?, NULL, '', NULL, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.phone)
            .bind(&user.created_at)
            .bind(&user.updated_at)
            .execute(&mut *tx)
            .await?;
            user
        }
    };

    // Active conversation for the party.
    let conversation = match sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE platform = ? AND external_id = ? AND status = 'active'",
    )
    .bind(platform)
    .bind(external_id)
    .fetch_optional(&mut *tx)
    .await?
    {
        Some(conversation) => conversation,
        None => {
            let conversation = Conversation {
                id: new_id(),
                user_id: user.id.clone(),
                platform: platform.to_string(),
                external_id: external_id.to_string(),
                status: "active".to_string(),
                agent_enabled: true,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            sqlx::query(
                r#"
                INSERT INTO conversations
                    (id, user_id, platform, external_id, status, agent_enabled, created_at, updated_at)
                VALUES (?, ?, ?, ?, 'active', 1, ?, ?)
                "#,
            )
            .bind(&conversation.id)
            .bind(&conversation.user_id)
            .bind(&conversation.platform)
            .bind(&conversation.external_id)
            .bind(&conversation.created_at)
            .bind(&conversation.updated_at)
            .execute(&mut *tx)
            .await?;
            conversation
        }
    };

    // Lead qualification for the pair.
    let lead = match sqlx::query_as::<_, LeadQualification>(
        "SELECT * FROM lead_qualification WHERE user_id = ? AND conversation_id = ?",
    )
    .bind(&user.id)
    .bind(&conversation.id)
    .fetch_optional(&mut *tx)
    .await?
    {
        Some(lead) => lead,
        None => {
            let lead = LeadQualification {
                id: new_id(),
                user_id: user.id.clone(),
                conversation_id: conversation.id.clone(),
                consent: false,
                current_step: "start".to_string(),
                created_at: now.clone(),
                updated_at: now,
            };
            sqlx::query(
                r#"
                INSERT INTO lead_qualification
                    (id, user_id, conversation_id, consent, current_step, created_at, updated_at)
                VALUES (?, ?, ?, 0, 'start', ?, ?)
                "#,
            )
            .bind(&lead.id)
            .bind(&lead.user_id)
            .bind(&lead.conversation_id)
            .bind(&lead.created_at)
            .bind(&lead.updated_at)
            .execute(&mut *tx)
            .await?;
            lead
        }
    };

    tx.commit().await?;
    Ok((user, conversation, lead))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;

    #[tokio::test]
    async fn intake_is_idempotent() {
        let db = test_db().await;

        let (u1, c1, l1) =
            upsert_user_and_open_conversation(db.pool(), "whatsapp", "+15550001111")
                .await
                .unwrap();
        let (u2, c2, l2) =
            upsert_user_and_open_conversation(db.pool(), "whatsapp", "+15550001111")
                .await
                .unwrap();

        assert_eq!(u1.id, u2.id);
        assert_eq!(c1.id, c2.id);
        assert_eq!(l1.id, l2.id);
        assert_eq!(l1.current_step, "start");
    }

    #[tokio::test]
    async fn same_user_different_platforms_get_distinct_conversations() {
        let db = test_db().await;

        let (u1, c1, _) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+15550001111")
            .await
            .unwrap();
        let (u2, c2, _) = upsert_user_and_open_conversation(db.pool(), "web", "+15550001111")
            .await
            .unwrap();

        assert_eq!(u1.id, u2.id);
        assert_ne!(c1.id, c2.id);
    }

    #[tokio::test]
    async fn empty_party_is_rejected() {
        let db = test_db().await;
        let err = upsert_user_and_open_conversation(db.pool(), "whatsapp", "  ").await;
        assert!(matches!(err, Err(DatabaseError::Validation(_))));
    }
}
