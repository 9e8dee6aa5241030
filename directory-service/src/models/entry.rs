//! Directory entry models.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attribute names whose values are DNs of other entries and are stored as
/// membership edges rather than in the attribute maps.
pub const MEMBER_ATTRIBUTES: &[&str] = &["member", "uniquemember", "owner"];

pub fn is_member_attribute(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    MEMBER_ATTRIBUTES.contains(&name.as_str())
}

/// A named attribute with its values, as supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A membership reference declared on a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// Normalized attribute name that declared the reference.
    pub role: String,
    /// Referenced DN as given.
    pub dn: String,
}

/// Input for inserting one entry.
#[derive(Debug, Clone)]
pub struct AddEntry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl AddEntry {
    pub fn new(dn: Dn, attributes: Vec<Attribute>) -> Self {
        Self { dn, attributes }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn is_dc(&self) -> bool {
        self.dn.is_dc()
    }

    pub fn parent_dn(&self) -> Option<Dn> {
        self.dn.parent_dn()
    }

    pub fn rdn_norm(&self) -> &str {
        self.dn.rdn_norm()
    }

    pub fn rdn_orig(&self) -> &str {
        self.dn.rdn_orig()
    }

    /// Attributes stored in the entry row, i.e. everything but membership.
    pub fn stored_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(|a| !is_member_attribute(&a.name))
    }

    /// Membership references in declaration order.
    pub fn members(&self) -> Vec<MemberRef> {
        self.attributes
            .iter()
            .filter(|a| is_member_attribute(&a.name))
            .flat_map(|a| {
                let role = a.name.trim().to_lowercase();
                a.values.iter().map(move |v| MemberRef {
                    role: role.clone(),
                    dn: v.clone(),
                })
            })
            .collect()
    }
}

/// Entry row joined with its tree state.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EntryRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub rdn_orig: String,
    /// True once the entry has a tree node, i.e. it is the root or has
    /// received at least one child.
    pub has_subordinates: bool,
}

/// Materialized path row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TreeNode {
    pub id: i64,
    pub path: String,
}

/// Directed membership edge, subject lists object under `role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct MembershipEdge {
    pub subject_id: i64,
    pub role: String,
    pub object_id: i64,
}
