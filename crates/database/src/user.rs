//! User CRUD operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{new_id, now_rfc3339, User};

/// Input for creating or updating a user.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub company: Option<String>,
}

/// Create a new user. At least one of phone/email must be present.
pub async fn create_user(pool: &SqlitePool, input: &UserInput) -> Result<User> {
    if input.phone.is_none() && input.email.is_none() {
        return Err(DatabaseError::Validation(
            "user needs at least one of phone or email".into(),
        ));
    }

    let now = now_rfc3339();
    let user = User {
        id: new_id(),
        phone: input.phone.clone(),
        email: input.email.clone(),
        full_name: input.full_name.clone().unwrap_or_default(),
        company: input.company.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, phone, email, full_name, company, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.phone)
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(&user.company)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_unique(e, "phone or email already registered"))?;

    Ok(user)
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        })
}

/// Get a user by phone number, if one exists.
pub async fn get_user_by_phone(pool: &SqlitePool, phone: &str) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = ?")
        .bind(phone)
        .fetch_optional(pool)
        .await?)
}

/// Get a user by email, if one exists.
pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?)
}

/// Update a user's profile fields. `None` inputs leave the column untouched.
pub async fn update_user(pool: &SqlitePool, id: &str, input: &UserInput) -> Result<User> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET phone = COALESCE(?, phone),
            email = COALESCE(?, email),
            full_name = COALESCE(?, full_name),
            company = COALESCE(?, company),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.full_name)
    .bind(&input.company)
    .bind(now_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_unique(e, "phone or email already registered"))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        });
    }

    get_user(pool, id).await
}

/// Find a user by phone, creating one if absent. Existing profile fields win;
/// only missing ones are filled from the input.
pub async fn get_or_create_user(pool: &SqlitePool, input: &UserInput) -> Result<User> {
    if let Some(phone) = &input.phone {
        if let Some(user) = get_user_by_phone(pool, phone).await? {
            return fill_missing(pool, user, input).await;
        }
    }
    if let Some(email) = &input.email {
        if let Some(user) = get_user_by_email(pool, email).await? {
            return fill_missing(pool, user, input).await;
        }
    }
    create_user(pool, input).await
}

async fn fill_missing(pool: &SqlitePool, user: User, input: &UserInput) -> Result<User> {
    let patch = UserInput {
        phone: user.phone.is_none().then(|| input.phone.clone()).flatten(),
        email: user.email.is_none().then(|| input.email.clone()).flatten(),
        full_name: user
            .full_name
            .is_empty()
            .then(|| input.full_name.clone())
            .flatten(),
        company: user.company.is_none().then(|| input.company.clone()).flatten(),
    };

    if patch.phone.is_none()
        && patch.email.is_none()
        && patch.full_name.is_none()
        && patch.company.is_none()
    {
        return Ok(user);
    }
    update_user(pool, &user.id, &patch).await
}

/// List all users, newest last.
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    Ok(
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(pool)
            .await?,
    )
}

/// Count total users.
pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;

    fn phone_input(phone: &str) -> UserInput {
        UserInput {
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let db = test_db().await;

        let user = create_user(
            db.pool(),
            &UserInput {
                phone: Some("+15550001111".into()),
                email: Some("ana@acme.io".into()),
                full_name: Some("Ana Rodríguez".into()),
                company: Some("Acme".into()),
            },
        )
        .await
        .unwrap();

        let fetched = get_user(db.pool(), &user.id).await.unwrap();
        assert_eq!(fetched.full_name, "Ana Rodríguez");

        let by_phone = get_user_by_phone(db.pool(), "+15550001111").await.unwrap();
        assert_eq!(by_phone.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn requires_phone_or_email() {
        let db = test_db().await;
        let err = create_user(db.pool(), &UserInput::default()).await;
        assert!(matches!(err, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn phone_is_unique() {
        let db = test_db().await;
        create_user(db.pool(), &phone_input("+15550001111")).await.unwrap();
        let dup = create_user(db.pool(), &phone_input("+15550001111")).await;
        assert!(matches!(dup, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_and_fills_gaps() {
        let db = test_db().await;

        let first = get_or_create_user(db.pool(), &phone_input("+15550001111"))
            .await
            .unwrap();
        assert!(first.full_name.is_empty());

        let second = get_or_create_user(
            db.pool(),
            &UserInput {
                phone: Some("+15550001111".into()),
                full_name: Some("Ana".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.full_name, "Ana");
        assert_eq!(count_users(db.pool()).await.unwrap(), 1);
    }
}
