//! Common test utilities for directory-service integration tests.

#![allow(dead_code)]

use directory_service::dn::DirectoryContext;
use directory_service::models::{AddEntry, Attribute};
use directory_service::repository::Repository;
use directory_service::services::Database;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Once;

static INIT: Once = Once::new();

pub const SUFFIX: &str = "dc=example,dc=com";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,directory_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Test harness holding a migrated, emptied database.
pub struct TestStore {
    pub pool: PgPool,
    pub repo: Repository,
    pub ctx: DirectoryContext,
}

impl TestStore {
    pub async fn spawn() -> Self {
        init_tracing();

        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set to run integration tests");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        let db = Database::from_pool(pool.clone());
        db.run_migrations().await.expect("Failed to run migrations");
        cleanup_test_data(&pool)
            .await
            .expect("Failed to cleanup test data");

        let ctx = DirectoryContext::new(SUFFIX).expect("valid suffix");
        Self {
            repo: db.repository(),
            pool,
            ctx,
        }
    }

    /// Build an entry for `dn` with an `objectClass` and optional extra attributes.
    pub fn entry(&self, dn: &str, attributes: Vec<Attribute>) -> AddEntry {
        let dn = self.ctx.normalize_dn(dn).expect("valid test DN");
        let mut attrs = vec![Attribute::new("objectClass", ["top"])];
        attrs.extend(attributes);
        AddEntry::new(dn, attrs)
    }

    pub async fn insert(&self, dn: &str) -> i64 {
        let entry = self.entry(dn, Vec::new());
        self.repo
            .insert(&self.ctx, &entry)
            .await
            .unwrap_or_else(|e| panic!("Failed to insert {}: {}", dn, e))
    }

    pub async fn entry_count(&self) -> i64 {
        count(&self.pool, "SELECT COUNT(*) FROM ldap_entry").await
    }

    pub async fn tree_count(&self) -> i64 {
        count(&self.pool, "SELECT COUNT(*) FROM ldap_tree").await
    }

    pub async fn member_count(&self) -> i64 {
        count(&self.pool, "SELECT COUNT(*) FROM ldap_member").await
    }

    pub async fn members_of(&self, subject_id: i64) -> Vec<(String, i64)> {
        sqlx::query_as(
            "SELECT role, object_id FROM ldap_member \
             WHERE subject_id = $1 ORDER BY role, object_id",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read membership edges")
    }
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql)
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}

/// Remove all rows and reset id sequences.
pub async fn cleanup_test_data(pool: &PgPool) -> Result<(), sqlx::Error> {
    for trigger in ["reject_entry_at_commit", "drop_connection_on_insert"] {
        sqlx::query(&format!("DROP TRIGGER IF EXISTS {trigger} ON ldap_entry"))
            .execute(pool)
            .await?;
    }
    sqlx::query("TRUNCATE ldap_member, ldap_tree, ldap_entry RESTART IDENTITY CASCADE")
        .execute(pool)
        .await?;
    Ok(())
}
