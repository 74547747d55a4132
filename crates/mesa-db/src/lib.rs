//! # mesa-db
//!
//! PostgreSQL database layer for the mesa matching engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for availability, profiles, scores, and
//!   proposals
//! - Embedded schema migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use mesa_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/mesa").await?;
//!     db.migrate().await?;
//!
//!     let profile = db.profiles.fetch("uid-123").await?;
//!     println!("profile: {:?}", profile);
//!     Ok(())
//! }
//! ```

pub mod availability;
pub mod pool;
pub mod profiles;
pub mod proposals;
pub mod scores;

// Always compiled so integration tests (in tests/) can use the fixtures.
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::PgPool;

use mesa_core::{
    AvailabilityRepository, ProfileRepository, ProposalRepository, Result, ScoreRepository,
};

pub use availability::PgAvailabilityRepository;
pub use pool::{create_pool_with_config, PoolConfig};
pub use profiles::PgProfileRepository;
pub use proposals::PgProposalRepository;
pub use scores::PgScoreRepository;

/// Bundled repository handles over one shared pool.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
    pub availability: Arc<dyn AvailabilityRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub scores: Arc<dyn ScoreRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_config(database_url, PoolConfig::default()).await
    }

    /// Connect with explicit pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build repositories over an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Database {
            availability: Arc::new(PgAvailabilityRepository::new(pool.clone())),
            profiles: Arc::new(PgProfileRepository::new(pool.clone())),
            scores: Arc::new(PgScoreRepository::new(pool.clone())),
            proposals: Arc::new(PgProposalRepository::new(pool.clone())),
            pool,
        }
    }

    /// Run embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| mesa_core::Error::Internal(format!("migration failed: {}", e)))
    }
}
