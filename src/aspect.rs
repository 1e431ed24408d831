//! Aspect resolution: deriving sibling files from an anchor.
//!
//! Rules are applied once each, in configuration order. A rule fires when its
//! source role is already in the aggregate at that point and its target role
//! is still empty; the rendered candidate is attached only if the locator
//! confirms it exists. Several rules targeting one role therefore act as
//! ordered fallbacks, and the first existing candidate wins.

use crate::Role;
use crate::aggregate::{AggregateBuilder, ArticleAggregate};
use crate::config::Params;
use crate::locator::ContentLocator;
use crate::matcher::AnchorMatch;
use crate::sink::DiagnosticKind;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Derive the `target` role's path from the `source` role's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRule {
    pub source: Role,
    pub target: Role,
    pub template: Template,
}

impl AspectRule {
    pub fn new(source: Role, target: Role, template: Template) -> Self {
        Self {
            source,
            target,
            template,
        }
    }
}

/// Result of resolving one anchor.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub aggregate: ArticleAggregate,
    /// Existence checks that could not be answered.
    pub notes: Vec<DiagnosticKind>,
}

/// Applies [`AspectRule`]s and picks the full-text path.
#[derive(Debug, Clone)]
pub struct AspectResolver {
    rules: Vec<AspectRule>,
    precedence: Vec<Role>,
}

impl AspectResolver {
    pub fn new(rules: Vec<AspectRule>, precedence: Vec<Role>) -> Self {
        Self { rules, precedence }
    }

    pub fn rules(&self) -> &[AspectRule] {
        &self.rules
    }

    /// Candidate rules for `target`, in the order they are tried.
    pub fn rules_for(&self, target: Role) -> impl Iterator<Item = &AspectRule> {
        self.rules.iter().filter(move |rule| rule.target == target)
    }

    pub fn precedence(&self) -> &[Role] {
        &self.precedence
    }

    /// Build the aggregate for one anchor.
    ///
    /// Never fails: unrenderable candidates are skipped, and a locator error
    /// counts as "not found" and is noted.
    pub fn resolve(
        &self,
        anchor_path: &str,
        anchor: AnchorMatch,
        params: &Params,
        locator: &dyn ContentLocator,
    ) -> Resolution {
        let mut builder = AggregateBuilder::new(anchor_path, anchor);
        let mut notes = Vec::new();

        for rule in &self.rules {
            if builder.has_role(rule.target) || !builder.has_role(rule.source) {
                continue;
            }
            let Some(candidate) = builder.aggregate().bindings(params).render(&rule.template)
            else {
                debug!(template = %rule.template, "aspect template did not resolve");
                continue;
            };
            if builder.has_path(&candidate) {
                continue;
            }
            match locator.exists(&candidate) {
                Ok(true) => {
                    debug!(role = %rule.target, path = %candidate, "aspect attached");
                    builder.attach(rule.target, candidate);
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(path = %candidate, error = %e, "existence check failed");
                    notes.push(DiagnosticKind::LocatorUnavailable {
                        path: candidate,
                        message: e.to_string(),
                    });
                }
            }
        }

        Resolution {
            aggregate: builder.finish(&self.precedence),
            notes,
        }
    }
}
