//! Transactional write path of the directory store.
//!
//! [`Repository::insert`] runs entry creation, tree promotion and membership
//! edge insertion in one transaction. Race safety comes from PostgreSQL:
//! conditional inserts against unique constraints and a share lock on the
//! parent row. Nothing here retries; losers get a definitive error.

pub mod error;
mod inserter;
mod lookup;
pub mod member;
mod statements;
pub mod tree;

pub use error::RepositoryError;

use crate::dn::{DirectoryContext, Dn};
use crate::mapper;
use crate::models::{AddEntry, EntryRecord};
use crate::services::metrics::{DB_QUERY_DURATION, INSERTS_TOTAL};
use sqlx::{PgConnection, PgPool};
use statements::{InsertEntryParams, InsertTreeParams};
use tracing::{info, instrument, warn};

/// Entry store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one entry, its tree scaffolding and its membership edges as a
    /// single atomic unit. Returns the new entry id.
    #[instrument(skip(self, ctx, entry), fields(dn = %entry.dn(), depth = entry.dn().depth()))]
    pub async fn insert(
        &self,
        ctx: &DirectoryContext,
        entry: &AddEntry,
    ) -> Result<i64, RepositoryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_entry"])
            .start_timer();

        let result = self.insert_in_transaction(ctx, entry).await;

        timer.observe_duration();
        let label = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        INSERTS_TOTAL.with_label_values(&[label]).inc();

        if let Ok(id) = result {
            info!(id, "Entry inserted");
        }
        result
    }

    async fn insert_in_transaction(
        &self,
        ctx: &DirectoryContext,
        entry: &AddEntry,
    ) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            RepositoryError::Unavailable(anyhow::Error::new(e).context("begin transaction"))
        })?;

        let new_id = match insert_with_tx(&mut *tx, ctx, entry).await {
            Ok(id) => id,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(err);
            }
        };

        tx.commit().await.map_err(|e| {
            RepositoryError::Unavailable(anyhow::Error::new(e).context("commit transaction"))
        })?;

        Ok(new_id)
    }

    /// Look up an entry by DN together with whether it has subordinates.
    #[instrument(skip(self, ctx, dn), fields(dn = %dn))]
    pub async fn find_entry(
        &self,
        ctx: &DirectoryContext,
        dn: &Dn,
    ) -> Result<Option<EntryRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            RepositoryError::Unavailable(anyhow::Error::new(e).context("acquire connection"))
        })?;
        lookup::find_entry(&mut conn, ctx, dn).await
    }

    /// Materialized path of an entry, if it has been promoted.
    #[instrument(skip(self))]
    pub async fn tree_path(&self, id: i64) -> Result<Option<String>, RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            RepositoryError::Unavailable(anyhow::Error::new(e).context("acquire connection"))
        })?;
        Ok(lookup::find_tree_node(&mut conn, id)
            .await?
            .map(|node| node.path))
    }
}

async fn insert_with_tx(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
    entry: &AddEntry,
) -> Result<i64, RepositoryError> {
    let row = mapper::to_storage_row(entry)?;
    let params = InsertEntryParams {
        rdn_norm: entry.rdn_norm(),
        rdn_orig: entry.rdn_orig(),
        uuid: row.uuid,
        created: row.created,
        updated: row.updated,
        attrs_norm: &row.attrs_norm,
        attrs_orig: &row.attrs_orig,
    };

    if entry.is_dc() {
        let id = inserter::insert_dc_entry(conn, &params).await?;
        tree::promote(
            conn,
            InsertTreeParams {
                id,
                parent_id: None,
            },
        )
        .await?;
        member::insert_members(conn, ctx, id, entry).await?;
        return Ok(id);
    }

    let parent_dn = entry.parent_dn().ok_or_else(|| {
        RepositoryError::Internal(anyhow::anyhow!("{} has no parent DN", entry.dn()))
    })?;

    let new_id = if parent_dn.is_dc() {
        let dc = lookup::find_dc_entry(conn, ctx)
            .await?
            .ok_or(RepositoryError::NoSuchObject)?;
        if !dc.has_subordinates {
            tree::promote(
                conn,
                InsertTreeParams {
                    id: dc.id,
                    parent_id: None,
                },
            )
            .await?;
        }
        let (id, _parent_id) = inserter::insert_under_dc_entry(conn, &params).await?;
        id
    } else {
        let parent_id = lookup::resolve_dn_id(conn, ctx, &parent_dn)
            .await?
            .ok_or_else(|| {
                info!(parent_path = ?entry.dn().parent_path(), "Parent entry not found");
                RepositoryError::NoSuchObject
            })?;
        // Deleted between resolution and lock: same answer as never found.
        let parent = lookup::lock_entry(conn, parent_id)
            .await?
            .ok_or(RepositoryError::NoSuchObject)?;
        if !parent.has_subordinates {
            tree::promote(
                conn,
                InsertTreeParams {
                    id: parent.id,
                    parent_id: parent.parent_id,
                },
            )
            .await?;
        }
        let (id, _parent_id) = inserter::insert_entry(conn, parent.id, &params).await?;
        id
    };

    member::insert_members(conn, ctx, new_id, entry).await?;
    Ok(new_id)
}
