//! The last gate before a record leaves the engine.

use crate::aggregate::ArticleAggregate;
use crate::config::Params;
use crate::cook::{CookedRecord, Field};
use crate::locator::ContentLocator;
use crate::template::Template;
use serde::{Deserialize, Serialize};

/// Emission requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitPolicy {
    /// Reject records without a journal title after backfill.
    pub require_journal_title: bool,
    /// A file that must exist for the record to be valid. On success its path
    /// becomes the record's `AccessURL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub companion: Option<Template>,
    /// Without a companion, set an unset `AccessURL` to the full-text path
    /// (or the anchor when there is none).
    pub fill_access_url: bool,
}

impl Default for EmitPolicy {
    fn default() -> Self {
        Self {
            require_journal_title: true,
            companion: None,
            fill_access_url: true,
        }
    }
}

/// Why a record was not emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingJournalTitle,
    /// The companion file does not exist, or its existence could not be checked.
    MissingCompanion { path: String },
    /// The companion template references a variable the aggregate cannot bind.
    UnresolvedCompanion { template: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingJournalTitle => f.write_str("missing journal title"),
            RejectReason::MissingCompanion { path } => write!(f, "missing companion {path}"),
            RejectReason::UnresolvedCompanion { template } => {
                write!(f, "missing companion: `{template}` does not resolve")
            }
        }
    }
}

/// Applies an [`EmitPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: EmitPolicy,
}

impl Validator {
    pub fn new(policy: EmitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EmitPolicy {
        &self.policy
    }

    /// Decide whether `record` may be emitted, setting `AccessURL` on success.
    ///
    /// The journal title is checked before the companion, so a record failing
    /// both is reported as missing its title.
    pub fn should_emit(
        &self,
        record: &mut CookedRecord,
        aggregate: &ArticleAggregate,
        params: &Params,
        locator: &dyn ContentLocator,
    ) -> Result<(), RejectReason> {
        if self.policy.require_journal_title && !record.contains(Field::JournalTitle) {
            return Err(RejectReason::MissingJournalTitle);
        }

        if let Some(template) = &self.policy.companion {
            let Some(path) = aggregate.bindings(params).render(template) else {
                return Err(RejectReason::UnresolvedCompanion {
                    template: template.to_string(),
                });
            };
            // An unanswerable existence check counts as absent.
            if !locator.exists(&path).unwrap_or(false) {
                return Err(RejectReason::MissingCompanion { path });
            }
            record.set(Field::AccessUrl, path);
        } else if self.policy.fill_access_url && !record.contains(Field::AccessUrl) {
            let url = aggregate
                .full_text_path()
                .unwrap_or_else(|| aggregate.anchor_path());
            record.set(Field::AccessUrl, url);
        }

        Ok(())
    }
}
