//! Run-scoped journal-title backfill.
//!
//! Archived issues often carry the journal title on their first article only.
//! [`TitleCache`] remembers titles by journal identifier and lends them to
//! later records of the same run that lack one.

use crate::cook::{CookedRecord, Field};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Journal identifiers, in lookup precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdentityKey {
    #[serde(rename = "ISSN")]
    Issn,
    #[serde(rename = "EISSN")]
    Eissn,
    #[serde(rename = "ProprietaryID")]
    ProprietaryId,
}

impl IdentityKey {
    /// Lookup order.
    pub const PRECEDENCE: [IdentityKey; 3] =
        [IdentityKey::Issn, IdentityKey::Eissn, IdentityKey::ProprietaryId];

    pub fn field(&self) -> Field {
        match self {
            IdentityKey::Issn => Field::Issn,
            IdentityKey::Eissn => Field::Eissn,
            IdentityKey::ProprietaryId => Field::ProprietaryId,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.field().as_str()
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`TitleCache::backfill`] did to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backfill {
    /// The record had a title; it was remembered under every key present.
    Present,
    /// A title cached under `key` = `value` was adopted.
    Borrowed { key: IdentityKey, value: String },
    /// No cached title; an `UNKNOWN_TITLE/<key>=<value>` placeholder was set.
    Placeholder { key: IdentityKey },
    /// No title and no identifier to build one from.
    Absent,
}

/// A title cached under one key was replaced by a different title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub key: IdentityKey,
    pub value: String,
    pub previous: String,
    pub current: String,
}

/// Outcome of one backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub backfill: Backfill,
    pub collisions: Vec<Collision>,
}

/// Journal titles keyed by identifier, shared by every record of one run.
///
/// The latest title seen for a key wins. Placeholders are never cached, so a
/// real title arriving later is not shadowed.
#[derive(Debug, Default)]
pub struct TitleCache {
    titles: Mutex<HashMap<(IdentityKey, String), String>>,
}

/// Build the placeholder title used when nothing better is known.
pub fn placeholder_title(key: IdentityKey, value: &str) -> String {
    format!("UNKNOWN_TITLE/{key}={value}")
}

impl TitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cached title for `key` = `value`.
    pub fn get(&self, key: IdentityKey, value: &str) -> Option<String> {
        self.lock().get(&(key, value.to_string())).cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(IdentityKey, String), String>> {
        self.titles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill in `record`'s journal title, touching no other field.
    ///
    /// 1. A record with a title teaches it to the cache under every
    ///    identifier it carries.
    /// 2. Otherwise the first identifier (ISSN, EISSN, ProprietaryID) with a
    ///    cached title lends it.
    /// 3. Otherwise the first identifier present yields a placeholder.
    pub fn backfill(&self, record: &mut CookedRecord) -> BackfillOutcome {
        let identifiers: Vec<(IdentityKey, String)> = IdentityKey::PRECEDENCE
            .into_iter()
            .filter_map(|key| record.get(key.field()).map(|v| (key, v.to_string())))
            .collect();

        let mut titles = self.lock();

        if let Some(title) = record.get(Field::JournalTitle) {
            let mut collisions = Vec::new();
            for (key, value) in identifiers {
                let previous = titles.insert((key, value.clone()), title.to_string());
                if let Some(previous) = previous.filter(|p| p != title) {
                    collisions.push(Collision {
                        key,
                        value,
                        previous,
                        current: title.to_string(),
                    });
                }
            }
            return BackfillOutcome {
                backfill: Backfill::Present,
                collisions,
            };
        }

        let borrowed = identifiers
            .iter()
            .find_map(|(key, value)| titles.get(&(*key, value.clone())).map(|t| (*key, value, t)));
        let backfill = match borrowed {
            Some((key, value, title)) => {
                record.set(Field::JournalTitle, title.clone());
                Backfill::Borrowed {
                    key,
                    value: value.clone(),
                }
            }
            None => match identifiers.first() {
                Some((key, value)) => {
                    record.set(Field::JournalTitle, placeholder_title(*key, value));
                    Backfill::Placeholder { key: *key }
                }
                None => Backfill::Absent,
            },
        };

        BackfillOutcome {
            backfill,
            collisions: Vec::new(),
        }
    }
}
