//! Conditional entry-row inserts.
//!
//! Every insert is a single `INSERT .. ON CONFLICT DO NOTHING RETURNING`
//! statement. An empty result means a sibling with the same normalized RDN
//! (or, for the root, any root) already exists.

use super::error::RepositoryError;
use super::statements::{InsertEntryParams, INSERT_DC_ENTRY, INSERT_ENTRY, INSERT_UNDER_DC_ENTRY};
use sqlx::PgConnection;
use tracing::{instrument, warn};

/// Insert the domain-component root. Returns the new id.
#[instrument(skip(conn, params), fields(rdn_norm = %params.rdn_norm))]
pub(crate) async fn insert_dc_entry(
    conn: &mut PgConnection,
    params: &InsertEntryParams<'_>,
) -> Result<i64, RepositoryError> {
    let id = sqlx::query_scalar::<_, i64>(INSERT_DC_ENTRY)
        .bind(params.rdn_norm)
        .bind(params.rdn_orig)
        .bind(params.uuid)
        .bind(params.created)
        .bind(params.updated)
        .bind(params.attrs_norm)
        .bind(params.attrs_orig)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_insert("insert DC entry".to_string(), e))?;

    match id {
        Some(id) => Ok(id),
        None => {
            warn!(rdn_norm = %params.rdn_norm, "Root entry already exists");
            Err(RepositoryError::AlreadyExists)
        }
    }
}

/// Insert a direct child of the domain-component root. Returns
/// `(id, parent_id)`.
#[instrument(skip(conn, params), fields(rdn_norm = %params.rdn_norm))]
pub(crate) async fn insert_under_dc_entry(
    conn: &mut PgConnection,
    params: &InsertEntryParams<'_>,
) -> Result<(i64, i64), RepositoryError> {
    let row = sqlx::query_as::<_, (i64, i64)>(INSERT_UNDER_DC_ENTRY)
        .bind(params.rdn_norm)
        .bind(params.rdn_orig)
        .bind(params.uuid)
        .bind(params.created)
        .bind(params.updated)
        .bind(params.attrs_norm)
        .bind(params.attrs_orig)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_insert("insert entry under DC".to_string(), e))?;

    row.ok_or_else(|| {
        warn!(rdn_norm = %params.rdn_norm, "Entry already exists under DC");
        RepositoryError::AlreadyExists
    })
}

/// Insert a child of `parent_id`. The caller holds a lock on the parent row.
/// Returns `(id, parent_id)`.
#[instrument(skip(conn, params), fields(rdn_norm = %params.rdn_norm))]
pub(crate) async fn insert_entry(
    conn: &mut PgConnection,
    parent_id: i64,
    params: &InsertEntryParams<'_>,
) -> Result<(i64, i64), RepositoryError> {
    let row = sqlx::query_as::<_, (i64, i64)>(INSERT_ENTRY)
        .bind(parent_id)
        .bind(params.rdn_norm)
        .bind(params.rdn_orig)
        .bind(params.uuid)
        .bind(params.created)
        .bind(params.updated)
        .bind(params.attrs_norm)
        .bind(params.attrs_orig)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            RepositoryError::from_insert(format!("insert entry parent_id={}", parent_id), e)
        })?;

    row.ok_or_else(|| {
        tracing::debug!(parent_id, rdn_norm = %params.rdn_norm, "Entry already exists");
        RepositoryError::AlreadyExists
    })
}
