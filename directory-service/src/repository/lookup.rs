//! Locating entries by DN inside a transaction.

use super::error::RepositoryError;
use super::statements::{
    FIND_DC_ENTRY, FIND_ENTRY_BY_ID, FIND_TREE_NODE, LOCK_ENTRY_BY_ID, RESOLVE_DN,
};
use crate::dn::{DirectoryContext, Dn};
use crate::models::{EntryRecord, TreeNode};
use sqlx::PgConnection;

/// Resolve `dn` to an entry id; `Ok(None)` when any level is missing.
pub(crate) async fn resolve_dn_id(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
    dn: &Dn,
) -> Result<Option<i64>, RepositoryError> {
    sqlx::query_scalar::<_, i64>(RESOLVE_DN)
        .bind(ctx.suffix().norm())
        .bind(dn.rdns_from_top())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage(format!("resolve DN {}", dn.dn_norm()), e))
}

pub(crate) async fn find_dc_entry(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
) -> Result<Option<EntryRecord>, RepositoryError> {
    sqlx::query_as::<_, EntryRecord>(FIND_DC_ENTRY)
        .bind(ctx.suffix().norm())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage("find DC entry".to_string(), e))
}

pub(crate) async fn find_entry_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<EntryRecord>, RepositoryError> {
    sqlx::query_as::<_, EntryRecord>(FIND_ENTRY_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage(format!("find entry id={}", id), e))
}

/// Share-lock the entry row for the rest of the transaction and return its
/// current state. `Ok(None)` means it vanished since it was resolved.
pub(crate) async fn lock_entry(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<EntryRecord>, RepositoryError> {
    sqlx::query_as::<_, EntryRecord>(LOCK_ENTRY_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage(format!("lock entry id={}", id), e))
}

/// Find the entry named by `dn`, with its tree state.
pub(crate) async fn find_entry(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
    dn: &Dn,
) -> Result<Option<EntryRecord>, RepositoryError> {
    if dn.is_dc() {
        return find_dc_entry(conn, ctx).await;
    }
    match resolve_dn_id(conn, ctx, dn).await? {
        Some(id) => find_entry_by_id(conn, id).await,
        None => Ok(None),
    }
}

pub(crate) async fn find_tree_node(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<TreeNode>, RepositoryError> {
    sqlx::query_as::<_, TreeNode>(FIND_TREE_NODE)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage(format!("find tree node id={}", id), e))
}
