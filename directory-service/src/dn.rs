//! Distinguished name handling.
//!
//! Every DN the repository sees is parsed relative to the directory suffix
//! (the domain-component root). A [`Dn`] keeps the RDNs below the suffix,
//! leaf first, in both normalized and original form. The suffix entry itself
//! is stored as a single row whose RDN is the whole suffix DN.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("Invalid DN syntax: {0}")]
    InvalidSyntax(String),

    #[error("DN is not within the directory suffix: {0}")]
    OutsideSuffix(String),
}

/// One naming component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    norm: String,
    orig: String,
}

impl Rdn {
    pub fn norm(&self) -> &str {
        &self.norm
    }

    pub fn orig(&self) -> &str {
        &self.orig
    }
}

/// The directory's naming suffix, e.g. `dc=example,dc=com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix {
    rdns: Vec<Rdn>,
    norm: String,
    orig: String,
}

impl Suffix {
    fn new(rdns: Vec<Rdn>) -> Self {
        let norm = join(rdns.iter().map(Rdn::norm));
        let orig = join(rdns.iter().map(Rdn::orig));
        Self { rdns, norm, orig }
    }

    pub fn norm(&self) -> &str {
        &self.norm
    }

    pub fn orig(&self) -> &str {
        &self.orig
    }
}

/// Normalization context passed into repository operations.
///
/// Cheap to clone; the suffix is shared.
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    suffix: Arc<Suffix>,
}

impl DirectoryContext {
    pub fn new(suffix: &str) -> Result<Self, DnError> {
        let rdns = parse_components(suffix)?;
        Ok(Self {
            suffix: Arc::new(Suffix::new(rdns)),
        })
    }

    pub fn suffix(&self) -> &Suffix {
        &self.suffix
    }

    /// DN of the domain-component root entry.
    pub fn dc_dn(&self) -> Dn {
        Dn {
            rdns: Vec::new(),
            suffix: Arc::clone(&self.suffix),
        }
    }

    /// Parse and normalize `dn`, which must be the suffix or lie below it.
    pub fn normalize_dn(&self, dn: &str) -> Result<Dn, DnError> {
        let mut rdns = parse_components(dn)?;
        let suffix_len = self.suffix.rdns.len();

        if rdns.len() < suffix_len {
            return Err(DnError::OutsideSuffix(dn.to_string()));
        }

        let split = rdns.len() - suffix_len;
        let tail_matches = rdns[split..]
            .iter()
            .zip(&self.suffix.rdns)
            .all(|(a, b)| a.norm == b.norm);
        if !tail_matches {
            return Err(DnError::OutsideSuffix(dn.to_string()));
        }

        rdns.truncate(split);
        Ok(Dn {
            rdns,
            suffix: Arc::clone(&self.suffix),
        })
    }
}

/// A normalized DN positioned relative to the suffix.
#[derive(Debug, Clone)]
pub struct Dn {
    /// RDNs below the suffix, leaf first.
    rdns: Vec<Rdn>,
    suffix: Arc<Suffix>,
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.dn_norm() == other.dn_norm()
    }
}

impl Eq for Dn {}

impl Dn {
    /// True when this DN names the domain-component root.
    pub fn is_dc(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Parent DN; `None` for the domain-component root.
    pub fn parent_dn(&self) -> Option<Dn> {
        if self.is_dc() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
            suffix: Arc::clone(&self.suffix),
        })
    }

    pub fn rdn_norm(&self) -> &str {
        match self.rdns.first() {
            Some(rdn) => &rdn.norm,
            None => self.suffix.norm(),
        }
    }

    pub fn rdn_orig(&self) -> &str {
        match self.rdns.first() {
            Some(rdn) => &rdn.orig,
            None => self.suffix.orig(),
        }
    }

    pub fn dn_norm(&self) -> String {
        join(
            self.rdns
                .iter()
                .map(Rdn::norm)
                .chain(std::iter::once(self.suffix.norm())),
        )
    }

    pub fn dn_orig(&self) -> String {
        join(
            self.rdns
                .iter()
                .map(Rdn::orig)
                .chain(std::iter::once(self.suffix.orig())),
        )
    }

    /// Number of levels below the suffix.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Normalized RDNs below the suffix, root side first.
    pub fn rdns_from_top(&self) -> Vec<String> {
        self.rdns.iter().rev().map(|r| r.norm.clone()).collect()
    }

    /// Name path of the parent below the suffix, e.g. `/ou=people` for
    /// `cn=alice,ou=people,<suffix>` and `/` for a child of the root.
    /// `None` for the root itself.
    pub fn parent_path(&self) -> Option<String> {
        if self.is_dc() {
            return None;
        }
        let above: Vec<&str> = self.rdns[1..].iter().rev().map(Rdn::norm).collect();
        Some(format!("/{}", above.join("/")))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dn_orig())
    }
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(",")
}

/// Split on `sep` where it is not escaped with a backslash.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Case-fold `value` and collapse unescaped whitespace runs to one space.
/// Backslash-escaped characters are kept as written (lower-cased).
pub(crate) fn fold_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    let mut pending_space = false;

    for c in value.chars() {
        if escaped {
            out.extend(c.to_lowercase());
            escaped = false;
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '\\' {
            escaped = true;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Trim surrounding whitespace, keeping a trailing space escaped as `\ `.
fn trim_value(value: &str) -> &str {
    let value = value.trim_start();
    let mut end = value.len();
    for (i, c) in value.char_indices().rev() {
        if !c.is_whitespace() {
            break;
        }
        let backslashes = value[..i].chars().rev().take_while(|&b| b == '\\').count();
        if backslashes % 2 == 1 {
            break;
        }
        end = i;
    }
    &value[..end]
}

fn ends_with_dangling_escape(value: &str) -> bool {
    value.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn parse_rdn(raw: &str, dn: &str) -> Result<Rdn, DnError> {
    let mut norm_parts = Vec::new();
    let mut orig_parts = Vec::new();

    for ava in split_unescaped(raw, '+') {
        let (attr, value) = ava
            .split_once('=')
            .ok_or_else(|| DnError::InvalidSyntax(dn.to_string()))?;
        let attr = attr.trim();
        let value = trim_value(value);
        if attr.is_empty() || value.is_empty() || ends_with_dangling_escape(value) {
            return Err(DnError::InvalidSyntax(dn.to_string()));
        }
        norm_parts.push(format!("{}={}", attr.to_lowercase(), fold_value(value)));
        orig_parts.push(format!("{}={}", attr, value));
    }

    // Multi-valued RDNs compare equal regardless of component order.
    norm_parts.sort();

    Ok(Rdn {
        norm: norm_parts.join("+"),
        orig: orig_parts.join("+"),
    })
}

fn parse_components(dn: &str) -> Result<Vec<Rdn>, DnError> {
    if dn.trim().is_empty() {
        return Err(DnError::InvalidSyntax(dn.to_string()));
    }
    split_unescaped(dn, ',')
        .into_iter()
        .map(|raw| parse_rdn(raw, dn))
        .collect()
}
