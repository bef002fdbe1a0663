//! SQLite persistence layer for the lead-qualification service.
//!
//! This crate is the sole mutator of the persistent store. Every other
//! component goes through the typed operations exposed here, organized one
//! module per entity plus transactional intake helpers.
//!
//! # Example
//!
//! ```no_run
//! use database::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite:leads.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let (user, conversation, lead) =
//!         database::intake::upsert_user_and_open_conversation(
//!             db.pool(), "whatsapp", "+15551230000").await?;
//!     println!("{} {} {}", user.id, conversation.id, lead.id);
//!     Ok(())
//! }
//! ```

pub mod bant;
pub mod conversation;
pub mod error;
pub mod intake;
pub mod lead;
pub mod meeting;
pub mod message;
pub mod models;
pub mod requirements;
pub mod stats;
pub mod tool_history;
pub mod user;

pub use error::{DatabaseError, Result};
pub use models::{
    BantData, Conversation, Feature, Integration, LeadQualification, Meeting, Message,
    Requirements, User,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `sqlite::memory:` for tests.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Connected to database: {}", url);

        Ok(Self { pool })
    }

    /// Run database migrations. Call once after connecting.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap connectivity probe for health endpoints.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    db
}
