//! Fixed statement text for the write path.
//!
//! Statements are plain constants; sqlx prepares and caches them per pooled
//! connection on first use. Batched statements are assembled with
//! `sqlx::QueryBuilder` in the member resolver instead.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Resolve a DN to an id by walking `$2` (normalized RDNs, root side first)
/// down from the root entry named `$1`.
pub(crate) const RESOLVE_DN: &str = r#"
    WITH RECURSIVE walk (id, depth) AS (
        SELECT e.id, 0
        FROM ldap_entry e
        WHERE e.parent_id IS NULL AND e.rdn_norm = $1
        UNION ALL
        SELECT c.id, w.depth + 1
        FROM walk w
        JOIN ldap_entry c ON c.parent_id = w.id
        WHERE w.depth < cardinality($2::text[])
          AND c.rdn_norm = ($2::text[])[w.depth + 1]
    )
    SELECT id FROM walk WHERE depth = cardinality($2::text[])
"#;

pub(crate) const FIND_ENTRY_BY_ID: &str = r#"
    SELECT e.id, e.parent_id, e.rdn_orig, (t.id IS NOT NULL) AS has_subordinates
    FROM ldap_entry e
    LEFT JOIN ldap_tree t ON t.id = e.id
    WHERE e.id = $1
"#;

/// Same projection as [`FIND_ENTRY_BY_ID`], holding a share lock on the
/// entry row until the transaction ends.
pub(crate) const LOCK_ENTRY_BY_ID: &str = r#"
    SELECT e.id, e.parent_id, e.rdn_orig, (t.id IS NOT NULL) AS has_subordinates
    FROM ldap_entry e
    LEFT JOIN ldap_tree t ON t.id = e.id
    WHERE e.id = $1
    FOR SHARE OF e
"#;

pub(crate) const FIND_DC_ENTRY: &str = r#"
    SELECT e.id, e.parent_id, e.rdn_orig, (t.id IS NOT NULL) AS has_subordinates
    FROM ldap_entry e
    LEFT JOIN ldap_tree t ON t.id = e.id
    WHERE e.parent_id IS NULL AND e.rdn_norm = $1
"#;

pub(crate) const INSERT_DC_ENTRY: &str = r#"
    INSERT INTO ldap_entry
        (parent_id, rdn_norm, rdn_orig, uuid, created, updated, attrs_norm, attrs_orig)
    SELECT NULL::bigint, $1::text, $2::text, $3::uuid,
           $4::timestamptz, $5::timestamptz, $6::jsonb, $7::jsonb
    WHERE NOT EXISTS (SELECT 1 FROM ldap_entry WHERE parent_id IS NULL)
    ON CONFLICT DO NOTHING
    RETURNING id
"#;

pub(crate) const INSERT_UNDER_DC_ENTRY: &str = r#"
    INSERT INTO ldap_entry
        (parent_id, rdn_norm, rdn_orig, uuid, created, updated, attrs_norm, attrs_orig)
    SELECT dc.id, $1::text, $2::text, $3::uuid,
           $4::timestamptz, $5::timestamptz, $6::jsonb, $7::jsonb
    FROM ldap_entry dc
    WHERE dc.parent_id IS NULL
    ON CONFLICT (parent_id, rdn_norm) DO NOTHING
    RETURNING id, parent_id
"#;

pub(crate) const INSERT_ENTRY: &str = r#"
    INSERT INTO ldap_entry
        (parent_id, rdn_norm, rdn_orig, uuid, created, updated, attrs_norm, attrs_orig)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (parent_id, rdn_norm) DO NOTHING
    RETURNING id, parent_id
"#;

pub(crate) const INSERT_ROOT_TREE: &str = r#"
    INSERT INTO ldap_tree (id, path)
    VALUES ($1, $2)
    ON CONFLICT (id) DO NOTHING
    RETURNING id, path
"#;

/// Promote `$1` by extending the path of its parent `$2`.
pub(crate) const INSERT_CHILD_TREE: &str = r#"
    INSERT INTO ldap_tree (id, path)
    SELECT $1::bigint, pt.path || '/' || $1::bigint::text
    FROM ldap_tree pt
    WHERE pt.id = $2
    ON CONFLICT (id) DO NOTHING
    RETURNING id, path
"#;

pub(crate) const FIND_TREE_NODE: &str = r#"
    SELECT id, path FROM ldap_tree WHERE id = $1
"#;

/// Direct children of `$1` that already carry a tree node.
pub(crate) const COLLECT_MATERIALIZED_CHILDREN: &str = r#"
    SELECT e.id, e.rdn_norm
    FROM ldap_entry e
    JOIN ldap_tree t ON t.id = e.id
    WHERE e.parent_id = $1
"#;

/// Column values shared by every entry insert.
#[derive(Debug, Clone)]
pub(crate) struct InsertEntryParams<'a> {
    pub rdn_norm: &'a str,
    pub rdn_orig: &'a str,
    pub uuid: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub attrs_norm: &'a Value,
    pub attrs_orig: &'a Value,
}

/// Promotion of `id` below `parent_id`; `None` promotes the root.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InsertTreeParams {
    pub id: i64,
    pub parent_id: Option<i64>,
}
