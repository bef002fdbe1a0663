//! Meeting operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, Meeting};

/// Input for recording a scheduled meeting.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub user_id: String,
    pub lead_qualification_id: String,
    pub external_meeting_id: Option<String>,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    pub online_meeting_url: Option<String>,
}

/// Record a meeting in status `scheduled`.
///
/// Rejected when `start_time >= end_time` or when the lead already has a
/// non-cancelled meeting.
pub async fn create_meeting(pool: &SqlitePool, new: &NewMeeting) -> Result<Meeting> {
    if new.start_time >= new.end_time {
        return Err(DatabaseError::Validation(
            "meeting start must precede its end".into(),
        ));
    }

    if active_meeting_for_lead(pool, &new.lead_qualification_id).await?.is_some() {
        return Err(DatabaseError::ConstraintViolation(
            "lead already has a non-cancelled meeting".into(),
        ));
    }

    let now = now_rfc3339();
    let meeting = Meeting {
        id: new_id(),
        user_id: new.user_id.clone(),
        lead_qualification_id: new.lead_qualification_id.clone(),
        external_meeting_id: new.external_meeting_id.clone(),
        subject: new.subject.clone(),
        start_time: new.start_time.clone(),
        end_time: new.end_time.clone(),
        status: "scheduled".to_string(),
        online_meeting_url: new.online_meeting_url.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO meetings
            (id, user_id, lead_qualification_id, external_meeting_id, subject,
             start_time, end_time, status, online_meeting_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&meeting.id)
    .bind(&meeting.user_id)
    .bind(&meeting.lead_qualification_id)
    .bind(&meeting.external_meeting_id)
    .bind(&meeting.subject)
    .bind(&meeting.start_time)
    .bind(&meeting.end_time)
    .bind(&meeting.status)
    .bind(&meeting.online_meeting_url)
    .bind(&meeting.created_at)
    .bind(&meeting.updated_at)
    .execute(pool)
    .await?;

    Ok(meeting)
}

/// Get a meeting by ID.
pub async fn get_meeting(pool: &SqlitePool, id: &str) -> Result<Meeting> {
    sqlx::query_as::<_, Meeting>("SELECT * FROM meetings WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Meeting",
            id: id.to_string(),
        })
}

/// Get a meeting by its calendar-provider id.
pub async fn get_meeting_by_external_id(
    pool: &SqlitePool,
    external_meeting_id: &str,
) -> Result<Option<Meeting>> {
    Ok(
        sqlx::query_as::<_, Meeting>("SELECT * FROM meetings WHERE external_meeting_id = ?")
            .bind(external_meeting_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// The lead's single non-cancelled meeting, if any.
pub async fn active_meeting_for_lead(pool: &SqlitePool, lead_id: &str) -> Result<Option<Meeting>> {
    Ok(sqlx::query_as::<_, Meeting>(
        r#"
        SELECT * FROM meetings
        WHERE lead_qualification_id = ? AND status != 'cancelled'
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?)
}

/// Update a meeting's status.
pub async fn set_meeting_status(pool: &SqlitePool, id: &str, status: &str) -> Result<Meeting> {
    if !["scheduled", "completed", "cancelled", "rescheduled"].contains(&status) {
        return Err(DatabaseError::Validation(format!(
            "unknown meeting status: {status}"
        )));
    }
    let result = sqlx::query("UPDATE meetings SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Meeting",
            id: id.to_string(),
        });
    }
    get_meeting(pool, id).await
}

/// Move a meeting to new times and mark it rescheduled.
pub async fn reschedule_meeting(
    pool: &SqlitePool,
    id: &str,
    start_time: &str,
    end_time: &str,
) -> Result<Meeting> {
    if start_time >= end_time {
        return Err(DatabaseError::Validation(
            "meeting start must precede its end".into(),
        ));
    }
    let result = sqlx::query(
        r#"
        UPDATE meetings
        SET start_time = ?, end_time = ?, status = 'rescheduled', updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(start_time)
    .bind(end_time)
    .bind(now_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Meeting",
            id: id.to_string(),
        });
    }
    get_meeting(pool, id).await
}

/// List a user's meetings in start order.
pub async fn list_user_meetings(pool: &SqlitePool, user_id: &str) -> Result<Vec<Meeting>> {
    Ok(sqlx::query_as::<_, Meeting>(
        "SELECT * FROM meetings WHERE user_id = ? ORDER BY start_time, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

/// List every meeting in start order.
pub async fn list_meetings(pool: &SqlitePool) -> Result<Vec<Meeting>> {
    Ok(
        sqlx::query_as::<_, Meeting>("SELECT * FROM meetings ORDER BY start_time, id")
            .fetch_all(pool)
            .await?,
    )
}

/// Count meetings whose start falls on the given UTC day (`YYYY-MM-DD`).
pub async fn count_meetings_on_day(pool: &SqlitePool, day: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM meetings WHERE start_time >= ? AND start_time < ? AND status != 'cancelled'",
    )
    .bind(format!("{day}T00:00:00.000Z"))
    .bind(format!("{day}T23:59:59.999Z"))
    .fetch_one(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::create_conversation;
    use crate::lead::get_or_create_lead;
    use crate::test_db;
    use crate::user::{create_user, UserInput};

    async fn seed_lead(pool: &SqlitePool) -> (String, String) {
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
        let lead = get_or_create_lead(pool, &user.id, &conv.id).await.unwrap();
        (user.id, lead.id)
    }

    fn meeting_input(user_id: &str, lead_id: &str) -> NewMeeting {
        NewMeeting {
            user_id: user_id.to_string(),
            lead_qualification_id: lead_id.to_string(),
            external_meeting_id: Some("AAMkAGI2".into()),
            subject: "Discovery call".into(),
            start_time: "2026-06-03T09:00:00.000Z".into(),
            end_time: "2026-06-03T10:00:00.000Z".into(),
            online_meeting_url: Some("https://meet.example/abc".into()),
        }
    }

    #[tokio::test]
    async fn one_live_meeting_per_lead() {
        let db = test_db().await;
        let (user_id, lead_id) = seed_lead(db.pool()).await;

        let first = create_meeting(db.pool(), &meeting_input(&user_id, &lead_id))
            .await
            .unwrap();
        assert_eq!(first.status, "scheduled");

        let second = create_meeting(db.pool(), &meeting_input(&user_id, &lead_id)).await;
        assert!(matches!(second, Err(DatabaseError::ConstraintViolation(_))));

        // Cancelling frees the slot.
        set_meeting_status(db.pool(), &first.id, "cancelled").await.unwrap();
        create_meeting(db.pool(), &meeting_input(&user_id, &lead_id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_inverted_times() {
        let db = test_db().await;
        let (user_id, lead_id) = seed_lead(db.pool()).await;

        let mut input = meeting_input(&user_id, &lead_id);
        input.end_time = input.start_time.clone();
        let err = create_meeting(db.pool(), &input).await;
        assert!(matches!(err, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn reschedule_updates_times_and_status() {
        let db = test_db().await;
        let (user_id, lead_id) = seed_lead(db.pool()).await;
        let meeting = create_meeting(db.pool(), &meeting_input(&user_id, &lead_id))
            .await
            .unwrap();

        let moved = reschedule_meeting(
            db.pool(),
            &meeting.id,
            "2026-06-04T11:00:00.000Z",
            "2026-06-04T12:00:00.000Z",
        )
        .await
        .unwrap();
        assert_eq!(moved.status, "rescheduled");
        assert!(moved.start_time.starts_with("2026-06-04T11"));

        // Still counts as the lead's live meeting.
        let active = active_meeting_for_lead(db.pool(), &lead_id).await.unwrap();
        assert_eq!(active.unwrap().id, meeting.id);
    }

    #[tokio::test]
    async fn day_count_ignores_cancelled() {
        let db = test_db().await;
        let (user_id, lead_id) = seed_lead(db.pool()).await;
        let meeting = create_meeting(db.pool(), &meeting_input(&user_id, &lead_id))
            .await
            .unwrap();

        assert_eq!(count_meetings_on_day(db.pool(), "2026-06-03").await.unwrap(), 1);
        set_meeting_status(db.pool(), &meeting.id, "cancelled").await.unwrap();
        assert_eq!(count_meetings_on_day(db.pool(), "2026-06-03").await.unwrap(), 0);
    }
}
