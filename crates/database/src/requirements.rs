//! Requirements, feature, and integration operations.

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, Feature, Integration, Requirements};

/// Get the requirements row for a lead, if present.
pub async fn get_requirements(pool: &SqlitePool, lead_id: &str) -> Result<Option<Requirements>> {
    Ok(sqlx::query_as::<_, Requirements>(
        "SELECT * FROM requirements WHERE lead_qualification_id = ?",
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?)
}

/// Get or create the requirements row for a lead.
pub async fn get_or_create_requirements(
    pool: &SqlitePool,
    lead_id: &str,
    app_type: Option<&str>,
    deadline: Option<&str>,
) -> Result<Requirements> {
    if let Some(existing) = get_requirements(pool, lead_id).await? {
        if app_type.is_some() || deadline.is_some() {
            sqlx::query(
                r#"
                UPDATE requirements
                SET app_type = COALESCE(app_type, ?), deadline = COALESCE(deadline, ?)
                WHERE id = ?
                "#,
            )
            .bind(app_type)
            .bind(deadline)
            .bind(&existing.id)
            .execute(pool)
            .await?;
            return get_requirements(pool, lead_id).await?.ok_or_else(|| {
                DatabaseError::NotFound {
                    entity: "Requirements",
                    id: lead_id.to_string(),
                }
            });
        }
        return Ok(existing);
    }

    let req = Requirements {
        id: new_id(),
        lead_qualification_id: lead_id.to_string(),
        app_type: app_type.map(str::to_string),
        deadline: deadline.map(str::to_string),
    };
    sqlx::query(
        "INSERT INTO requirements (id, lead_qualification_id, app_type, deadline) VALUES (?, ?, ?, ?)",
    )
    .bind(&req.id)
    .bind(&req.lead_qualification_id)
    .bind(&req.app_type)
    .bind(&req.deadline)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_unique(e, "lead already has requirements"))?;

    Ok(req)
}

/// Add a feature. Re-adding the same name is a no-op.
pub async fn add_feature(
    pool: &SqlitePool,
    requirement_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO features (id, requirement_id, name, description)
        VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(requirement_id)
    .bind(name)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(())
}

/// Add an integration. Re-adding the same name is a no-op.
pub async fn add_integration(
    pool: &SqlitePool,
    requirement_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO integrations (id, requirement_id, name, description)
        VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(requirement_id)
    .bind(name)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(())
}

/// List features of a requirements row.
pub async fn list_features(pool: &SqlitePool, requirement_id: &str) -> Result<Vec<Feature>> {
    Ok(sqlx::query_as::<_, Feature>(
        "SELECT * FROM features WHERE requirement_id = ? ORDER BY name",
    )
    .bind(requirement_id)
    .fetch_all(pool)
    .await?)
}

/// List integrations of a requirements row.
pub async fn list_integrations(
    pool: &SqlitePool,
    requirement_id: &str,
) -> Result<Vec<Integration>> {
    Ok(sqlx::query_as::<_, Integration>(
        "SELECT * FROM integrations WHERE requirement_id = ? ORDER BY name",
    )
    .bind(requirement_id)
    .fetch_all(pool)
    .await?)
}

/// Count features recorded for a lead.
pub async fn count_features(pool: &SqlitePool, lead_id: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM features f
        JOIN requirements r ON r.id = f.requirement_id
        WHERE r.lead_qualification_id = ?
        "#,
    )
    .bind(lead_id)
    .fetch_one(pool)
    .await?)
}

/// Atomically record a full requirement package: the requirements row plus
/// its features and integrations. Applying the same package twice leaves
/// state equivalent to applying it once.
pub async fn create_requirement_package(
    pool: &SqlitePool,
    lead_id: &str,
    app_type: Option<&str>,
    deadline: Option<&str>,
    features: &[(String, Option<String>)],
    integrations: &[(String, Option<String>)],
) -> Result<Requirements> {
    let mut tx: Transaction<'_, Sqlite> = pool.begin().await?;

    let existing = sqlx::query_as::<_, Requirements>(
        "SELECT * FROM requirements WHERE lead_qualification_id = ?",
    )
    .bind(lead_id)
    .fetch_optional(&mut *tx)
    .await?;

    let req = match existing {
        Some(req) => {
            sqlx::query(
                r#"
                UPDATE requirements
                SET app_type = COALESCE(app_type, ?), deadline = COALESCE(deadline, ?)
                WHERE id = ?
                "#,
            )
            .bind(app_type)
            .bind(deadline)
            .bind(&req.id)
            .execute(&mut *tx)
            .await?;
            req
        }
        None => {
            let req = Requirements {
                id: new_id(),
                lead_qualification_id: lead_id.to_string(),
                app_type: app_type.map(str::to_string),
                deadline: deadline.map(str::to_string),
            };
            sqlx::query(
                "INSERT INTO requirements (id, lead_qualification_id, app_type, deadline) VALUES (?, ?, ?, ?)",
            )
            .bind(&req.id)
            .bind(&req.lead_qualification_id)
            .bind(&req.app_type)
            .bind(&req.deadline)
            .execute(&mut *tx)
            .await?;
            req
        }
    };

    for (name, description) in features {
        sqlx::query(
            r#"
            INSERT INTO features (id, requirement_id, name, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&req.id)
        .bind(name)
        .bind(description)
        .execute(&mut *tx)
        .await?;
    }

    for (name, description) in integrations {
        sqlx::query(
            r#"
            INSERT INTO integrations (id, requirement_id, name, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&req.id)
        .bind(name)
        .bind(description)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get_requirements(pool, lead_id).await?.ok_or_else(|| DatabaseError::NotFound {
        entity: "Requirements",
        id: lead_id.to_string(),
    })
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

    fn named(names: &[&str]) -> Vec<(String, Option<String>)> {
        names.iter().map(|n| (n.to_string(), None)).collect()
    }

    #[tokio::test]
    async fn package_is_idempotent() {
        let db = test_db().await;
        let lead_id = seed_lead(db.pool()).await;

        let features = named(&["login", "reports"]);
        let integrations = named(&["stripe"]);

        create_requirement_package(
            db.pool(),
            &lead_id,
            Some("web"),
            Some("2026-12-01"),
            &features,
            &integrations,
        )
        .await
        .unwrap();

        let again = create_requirement_package(
            db.pool(),
            &lead_id,
            Some("web"),
            Some("2026-12-01"),
            &features,
            &integrations,
        )
        .await
        .unwrap();

        assert_eq!(again.app_type.as_deref(), Some("web"));
        assert_eq!(count_features(db.pool(), &lead_id).await.unwrap(), 2);
        assert_eq!(list_integrations(db.pool(), &again.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_feature_names_collapse() {
        let db = test_db().await;
        let lead_id = seed_lead(db.pool()).await;
        let req = get_or_create_requirements(db.pool(), &lead_id, Some("mobile"), None)
            .await
            .unwrap();

        add_feature(db.pool(), &req.id, "push notifications", None).await.unwrap();
        add_feature(db.pool(), &req.id, "push notifications", Some("APNs")).await.unwrap();

        assert_eq!(list_features(db.pool(), &req.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn app_type_first_write_wins() {
        let db = test_db().await;
        let lead_id = seed_lead(db.pool()).await;

        get_or_create_requirements(db.pool(), &lead_id, Some("web"), None).await.unwrap();
        let after = get_or_create_requirements(db.pool(), &lead_id, Some("mobile"), Some("Q4"))
            .await
            .unwrap();

        assert_eq!(after.app_type.as_deref(), Some("web"));
        assert_eq!(after.deadline.as_deref(), Some("Q4"));
    }
}
