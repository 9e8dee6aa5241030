//! Materialized-path maintenance.
//!
//! A tree node exists for the root and for every entry that has received a
//! child. Its path is the chain of entry ids from the root, joined by `/`.
//! Promotion is idempotent: losing a concurrent promotion is not an error.

use super::error::RepositoryError;
use super::lookup::find_tree_node;
use super::statements::{InsertTreeParams, INSERT_CHILD_TREE, INSERT_ROOT_TREE};
use crate::models::TreeNode;
use crate::services::metrics::TREE_PROMOTIONS_TOTAL;
use sqlx::PgConnection;
use tracing::{debug, instrument};

/// Insert the tree node for `params.id`, unless one exists already.
///
/// The parent's node must already be materialized; it always is, because an
/// entry is promoted before its first child is inserted.
#[instrument(skip(conn), fields(id = params.id, parent_id = ?params.parent_id))]
pub(crate) async fn promote(
    conn: &mut PgConnection,
    params: InsertTreeParams,
) -> Result<TreeNode, RepositoryError> {
    let inserted = match params.parent_id {
        None => sqlx::query_as::<_, TreeNode>(INSERT_ROOT_TREE)
            .bind(params.id)
            .bind(root_path(params.id))
            .fetch_optional(&mut *conn)
            .await,
        Some(parent_id) => sqlx::query_as::<_, TreeNode>(INSERT_CHILD_TREE)
            .bind(params.id)
            .bind(parent_id)
            .fetch_optional(&mut *conn)
            .await,
    }
    .map_err(|e| RepositoryError::storage(format!("insert tree node id={}", params.id), e))?;

    if let Some(node) = inserted {
        TREE_PROMOTIONS_TOTAL.with_label_values(&["created"]).inc();
        debug!(path = %node.path, "Tree node created");
        return Ok(node);
    }

    // Nothing inserted: either another transaction promoted it first, or the
    // parent's node is missing.
    match find_tree_node(conn, params.id).await? {
        Some(node) => {
            TREE_PROMOTIONS_TOTAL.with_label_values(&["existing"]).inc();
            debug!(path = %node.path, "Tree node already present");
            Ok(node)
        }
        None => Err(RepositoryError::Internal(anyhow::anyhow!(
            "cannot promote entry {}: parent {:?} has no tree node",
            params.id,
            params.parent_id
        ))),
    }
}

/// Root path for an entry id.
pub fn root_path(id: i64) -> String {
    id.to_string()
}

/// Path of a child given its parent's path.
pub fn child_path(parent_path: &str, id: i64) -> String {
    format!("{}/{}", parent_path, id)
}
