//! The role → path map for one logical article.
//!
//! # Design Decision
//!
//! - **One winner per role**: the first path attached under a role stays;
//!   later candidates for the same role are ignored.
//! - **One role per path**: a path already attached under some role is never
//!   attached under a second one.
//! - **Full text is derived**: `full_text_path` is the path of the first role
//!   from a configured precedence list that is present, fixed when the
//!   aggregate is finished.

use crate::Role;
use crate::config::Params;
use crate::matcher::{AnchorMatch, Bindings, Captures};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default full-text precedence: PDF, then XML, then HTML, then RIS.
pub const DEFAULT_FULL_TEXT_PRECEDENCE: [Role; 4] = [
    Role::FullTextPdf,
    Role::FullTextXml,
    Role::FullTextHtml,
    Role::CitationRis,
];

/// One logical article: its anchor, identity captures and every confirmed aspect.
///
/// Immutable once built; the only way to obtain one is through aspect resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleAggregate {
    anchor_path: String,
    anchor_role: Role,
    rule_index: usize,
    root: String,
    captures: Captures,
    roles: BTreeMap<Role, String>,
    full_text: Option<Role>,
}

impl ArticleAggregate {
    /// The path whose match created this aggregate.
    pub fn anchor_path(&self) -> &str {
        &self.anchor_path
    }

    pub fn anchor_role(&self) -> Role {
        self.anchor_role
    }

    /// Index of the pattern rule that matched the anchor.
    pub fn rule_index(&self) -> usize {
        self.rule_index
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn captures(&self) -> &Captures {
        &self.captures
    }

    /// Path attached under `role`, if any.
    pub fn get(&self, role: Role) -> Option<&str> {
        self.roles.get(&role).map(String::as_str)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains_key(&role)
    }

    /// All populated roles with their paths, in role order.
    pub fn roles(&self) -> impl Iterator<Item = (Role, &str)> {
        self.roles.iter().map(|(role, path)| (*role, path.as_str()))
    }

    /// Number of populated roles; never zero.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// The role chosen as canonical full text.
    pub fn full_text_role(&self) -> Option<Role> {
        self.full_text
    }

    /// Path of the canonical full text, if any precedence role is present.
    pub fn full_text_path(&self) -> Option<&str> {
        self.full_text.and_then(|role| self.get(role))
    }

    /// Template bindings for this aggregate's identity.
    pub fn bindings<'a>(&'a self, params: &'a Params) -> Bindings<'a> {
        Bindings {
            captures: &self.captures,
            root: &self.root,
            params,
        }
    }
}

/// In-progress aggregate used during aspect resolution.
#[derive(Debug)]
pub(crate) struct AggregateBuilder {
    inner: ArticleAggregate,
}

impl AggregateBuilder {
    /// Start an aggregate holding only the anchor.
    pub(crate) fn new(anchor_path: &str, anchor: AnchorMatch) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(anchor.role, anchor_path.to_string());
        Self {
            inner: ArticleAggregate {
                anchor_path: anchor_path.to_string(),
                anchor_role: anchor.role,
                rule_index: anchor.rule_index,
                root: anchor.root,
                captures: anchor.captures,
                roles,
                full_text: None,
            },
        }
    }

    pub(crate) fn aggregate(&self) -> &ArticleAggregate {
        &self.inner
    }

    pub(crate) fn has_role(&self, role: Role) -> bool {
        self.inner.roles.contains_key(&role)
    }

    pub(crate) fn has_path(&self, path: &str) -> bool {
        self.inner.roles.values().any(|p| p == path)
    }

    /// Attach `path` under `role` unless either is already taken.
    pub(crate) fn attach(&mut self, role: Role, path: String) -> bool {
        if self.has_role(role) || self.has_path(&path) {
            return false;
        }
        self.inner.roles.insert(role, path);
        true
    }

    /// Freeze the aggregate and choose its full text.
    pub(crate) fn finish(mut self, precedence: &[Role]) -> ArticleAggregate {
        self.inner.full_text = select_full_text(&self.inner, precedence);
        self.inner
    }
}

/// The first role of `precedence` that is present in `aggregate`.
pub fn select_full_text(aggregate: &ArticleAggregate, precedence: &[Role]) -> Option<Role> {
    precedence.iter().copied().find(|role| aggregate.contains(*role))
}
