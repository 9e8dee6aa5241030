//! Membership edge resolution and insertion.
//!
//! References are resolved in batches of [`MEMBER_BATCH_SIZE`]: each batch
//! issues one lookup for all `(parent_id, rdn_norm)` pairs and one bulk
//! insert. Parent ids come from a per-call cache seeded with the DC root and
//! its materialized children. Any unresolved reference fails the whole call
//! with `InvalidDnSyntax` so that no partial membership is ever written.

use super::error::RepositoryError;
use super::lookup::{find_dc_entry, resolve_dn_id};
use super::statements::COLLECT_MATERIALIZED_CHILDREN;
use crate::dn::{DirectoryContext, Dn};
use crate::models::{AddEntry, MemberRef, MembershipEdge};
use crate::services::metrics::MEMBER_EDGES_TOTAL;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

pub const MEMBER_BATCH_SIZE: usize = 100;

/// Normalized DN → entry id, for parents of referenced entries.
#[derive(Debug, Default)]
pub(crate) struct DnIdCache {
    ids: HashMap<String, i64>,
}

impl DnIdCache {
    /// Seed with the DC root and its direct children that have a tree node.
    pub(crate) async fn seed(
        conn: &mut PgConnection,
        ctx: &DirectoryContext,
    ) -> Result<Self, RepositoryError> {
        let mut cache = Self::default();

        let Some(dc) = find_dc_entry(conn, ctx).await? else {
            return Ok(cache);
        };
        let suffix_norm = ctx.suffix().norm();
        cache.ids.insert(suffix_norm.to_string(), dc.id);

        let children = sqlx::query_as::<_, (i64, String)>(COLLECT_MATERIALIZED_CHILDREN)
            .bind(dc.id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                RepositoryError::storage(format!("collect children of DC id={}", dc.id), e)
            })?;

        for (id, rdn_norm) in children {
            cache.ids.insert(format!("{},{}", rdn_norm, suffix_norm), id);
        }

        debug!(cached = cache.ids.len(), "Seeded DN id cache");
        Ok(cache)
    }

    pub(crate) fn get(&self, dn_norm: &str) -> Option<i64> {
        self.ids.get(dn_norm).copied()
    }

    pub(crate) fn insert(&mut self, dn_norm: String, id: i64) {
        self.ids.insert(dn_norm, id);
    }

    /// Id of `dn`, consulting the store on a miss and remembering the answer.
    async fn resolve(
        &mut self,
        conn: &mut PgConnection,
        ctx: &DirectoryContext,
        dn: &Dn,
    ) -> Result<Option<i64>, RepositoryError> {
        let key = dn.dn_norm();
        if let Some(id) = self.get(&key) {
            return Ok(Some(id));
        }
        let resolved = resolve_dn_id(conn, ctx, dn).await?;
        if let Some(id) = resolved {
            self.insert(key, id);
        }
        Ok(resolved)
    }
}

/// A membership reference after DN normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NormalizedRef {
    pub role: String,
    pub dn: Dn,
}

/// Normalize every reference and drop repeats of the same `(role, DN)`.
pub(crate) fn normalize_references(
    ctx: &DirectoryContext,
    members: &[MemberRef],
) -> Result<Vec<NormalizedRef>, RepositoryError> {
    let mut seen = HashSet::new();
    let mut refs = Vec::with_capacity(members.len());

    for m in members {
        let dn = ctx.normalize_dn(&m.dn).map_err(|e| {
            info!(role = %m.role, member_dn = %m.dn, error = %e, "Invalid member DN syntax");
            RepositoryError::InvalidDnSyntax
        })?;
        if seen.insert((m.role.clone(), dn.dn_norm())) {
            refs.push(NormalizedRef {
                role: m.role.clone(),
                dn,
            });
        }
    }

    Ok(refs)
}

/// How a reference in a batch is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Already known (the DC root itself).
    Known(i64),
    /// Index into [`MemberBatchParams::keys`].
    Lookup(usize),
}

/// One batch: distinct lookup keys plus the edges that depend on them.
#[derive(Debug, Default)]
pub(crate) struct MemberBatchParams {
    keys: Vec<(i64, String)>,
    edges: Vec<(String, Target)>,
}

impl MemberBatchParams {
    fn push(&mut self, role: String, parent_id: i64, rdn_norm: String) {
        let key = (parent_id, rdn_norm);
        let idx = match self.keys.iter().position(|k| *k == key) {
            Some(idx) => idx,
            None => {
                self.keys.push(key);
                self.keys.len() - 1
            }
        };
        self.edges.push((role, Target::Lookup(idx)));
    }

    fn push_known(&mut self, role: String, id: i64) {
        self.edges.push((role, Target::Known(id)));
    }

    /// Turn lookup results into edges. Fails unless every key resolved.
    fn into_edges(
        self,
        subject_id: i64,
        found: &HashMap<(i64, String), i64>,
    ) -> Result<Vec<MembershipEdge>, RepositoryError> {
        let missing: Vec<&(i64, String)> =
            self.keys.iter().filter(|k| !found.contains_key(*k)).collect();
        if !missing.is_empty() {
            warn!(
                subject_id,
                requested = self.keys.len(),
                missing = ?missing,
                "Member DN does not resolve to an entry"
            );
            return Err(RepositoryError::InvalidDnSyntax);
        }

        Ok(self
            .edges
            .into_iter()
            .map(|(role, target)| {
                let object_id = match target {
                    Target::Known(id) => id,
                    Target::Lookup(idx) => found[&self.keys[idx]],
                };
                MembershipEdge {
                    subject_id,
                    role,
                    object_id,
                }
            })
            .collect())
    }
}

/// Resolve and insert all membership edges declared by `entry`, owned by
/// the freshly inserted `subject_id`. Returns the number of edges written.
#[instrument(skip(conn, ctx, entry), fields(dn = %entry.dn()))]
pub(crate) async fn insert_members(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
    subject_id: i64,
    entry: &AddEntry,
) -> Result<usize, RepositoryError> {
    let members = entry.members();
    if members.is_empty() {
        debug!("Entry has no member attributes");
        return Ok(0);
    }

    let refs = normalize_references(ctx, &members)?;
    let mut cache = DnIdCache::seed(conn, ctx).await?;
    let mut inserted = 0;

    for batch in refs.chunks(MEMBER_BATCH_SIZE) {
        inserted += insert_member_batch(conn, ctx, &mut cache, subject_id, batch).await?;
    }

    info!(subject_id, edges = inserted, "Membership edges inserted");
    Ok(inserted)
}

async fn insert_member_batch(
    conn: &mut PgConnection,
    ctx: &DirectoryContext,
    cache: &mut DnIdCache,
    subject_id: i64,
    batch: &[NormalizedRef],
) -> Result<usize, RepositoryError> {
    let mut params = MemberBatchParams::default();

    for r in batch {
        let Some(parent) = r.dn.parent_dn() else {
            // The DC root itself; the cache was seeded with it.
            let id = cache.get(&r.dn.dn_norm()).ok_or_else(|| {
                info!(role = %r.role, member_dn = %r.dn, "DC entry not found for member");
                RepositoryError::InvalidDnSyntax
            })?;
            params.push_known(r.role.clone(), id);
            continue;
        };

        let parent_id = cache.resolve(conn, ctx, &parent).await?.ok_or_else(|| {
            info!(role = %r.role, member_dn = %r.dn, "Parent of member DN not found");
            RepositoryError::InvalidDnSyntax
        })?;
        params.push(r.role.clone(), parent_id, r.dn.rdn_norm().to_string());
    }

    let found = lookup_batch(conn, &params.keys).await?;
    let edges = params.into_edges(subject_id, &found)?;
    insert_edges(conn, &edges).await?;

    for edge in &edges {
        MEMBER_EDGES_TOTAL.with_label_values(&[&edge.role]).inc();
    }
    Ok(edges.len())
}

fn build_lookup_query(keys: &[(i64, String)]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT id, parent_id, rdn_norm FROM ldap_entry WHERE (parent_id, rdn_norm) IN ",
    );
    qb.push_tuples(keys.iter().cloned(), |mut b, (parent_id, rdn_norm)| {
        b.push_bind(parent_id).push_bind(rdn_norm);
    });
    qb
}

fn build_insert_query(edges: &[MembershipEdge]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("INSERT INTO ldap_member (subject_id, role, object_id) ");
    qb.push_values(edges.iter().cloned(), |mut b, edge| {
        b.push_bind(edge.subject_id)
            .push_bind(edge.role)
            .push_bind(edge.object_id);
    });
    qb
}

async fn lookup_batch(
    conn: &mut PgConnection,
    keys: &[(i64, String)],
) -> Result<HashMap<(i64, String), i64>, RepositoryError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = build_lookup_query(keys)
        .build_query_as::<(i64, i64, String)>()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage("fetch member ids".to_string(), e))?;

    Ok(rows
        .into_iter()
        .map(|(id, parent_id, rdn_norm)| ((parent_id, rdn_norm), id))
        .collect())
}

async fn insert_edges(
    conn: &mut PgConnection,
    edges: &[MembershipEdge],
) -> Result<(), RepositoryError> {
    if edges.is_empty() {
        return Ok(());
    }

    build_insert_query(edges)
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| RepositoryError::storage("bulk insert members".to_string(), e))?;
    Ok(())
}
