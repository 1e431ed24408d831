//! The compiled engine and its lazy runs.
//!
//! A [`Run`] pulls paths from the locator in batches. Within a batch, anchors
//! are resolved, extracted and cooked independently (on the rayon pool with
//! the `parallel` feature). Title backfill and validation then happen one
//! aggregate at a time in enumeration order, so the emitted sequence and the
//! diagnostics are the same whether or not the batch ran in parallel.

use crate::aggregate::ArticleAggregate;
use crate::aspect::{AspectResolver, Resolution};
use crate::cache::TitleCache;
use crate::config::{EngineConfig, Params};
use crate::cook::{CookMap, CookedRecord};
use crate::error::{ConfigError, ConfigErrorKind};
use crate::extract::Extractor;
use crate::locator::ContentLocator;
use crate::matcher::{AnchorMatch, IdentityMatcher};
use crate::sink::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::validate::Validator;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A compiled [`EngineConfig`]. Immutable, and shareable between threads.
#[derive(Debug, Clone)]
pub struct Engine {
    params: Params,
    matcher: IdentityMatcher,
    resolver: AspectResolver,
    extractor: Extractor,
    cook: CookMap,
    validator: Validator,
    batch_size: usize,
    run_in_parallel: bool,
}

/// One emitted article: its canonical metadata and the files it consists of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emitted {
    pub record: CookedRecord,
    pub aggregate: ArticleAggregate,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Paths pulled from the locator.
    pub enumerated: usize,
    /// Paths recognised as anchors.
    pub anchors: usize,
    /// Pairs actually returned by the run.
    pub emitted: usize,
    pub rejected: usize,
    /// Aggregates whose metadata could not be read.
    pub failed: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation for a [`Run`]. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Engine {
    /// Compile `config`: every regex, template and selector is checked here.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        if config.batch_size == 0 {
            return Err(ConfigError::new(
                "batch_size",
                "0",
                ConfigErrorKind::Empty("batch_size must be at least 1"),
            ));
        }

        let matcher = IdentityMatcher::new(&config.patterns, &config.params)?;
        let resolver = AspectResolver::new(config.aspects, config.full_text_precedence);
        let extractor = Extractor::new(&config.schema)?;
        let cook = CookMap::new(config.cook, config.defaults)?;
        let validator = Validator::new(config.emit);

        Ok(Self {
            params: config.params,
            matcher,
            resolver,
            extractor,
            cook,
            validator,
            batch_size: config.batch_size,
            run_in_parallel: config.run_in_parallel,
        })
    }

    /// Parse and compile a TOML configuration.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::new(EngineConfig::from_toml_str(source)?)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn matcher(&self) -> &IdentityMatcher {
        &self.matcher
    }

    pub fn resolver(&self) -> &AspectResolver {
        &self.resolver
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn cook_map(&self) -> &CookMap {
        &self.cook
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn run_in_parallel(&self) -> bool {
        self.run_in_parallel
    }

    /// Build the aggregate for `path`, or `None` when it is not an anchor.
    pub fn aggregate(&self, path: &str, locator: &dyn ContentLocator) -> Option<Resolution> {
        let anchor = self.matcher.match_path(path)?;
        Some(self.resolver.resolve(path, anchor, &self.params, locator))
    }

    /// Start a lazy run over everything `locator` holds below the configured roots.
    ///
    /// Each run has its own title cache. Nothing happens until the run is iterated.
    pub fn run<'a>(&'a self, locator: &'a dyn ContentLocator, sink: &'a dyn DiagnosticSink) -> Run<'a> {
        let roots: Vec<String> = self.matcher.roots().into_iter().map(str::to_string).collect();
        let paths = roots
            .into_iter()
            .flat_map(move |root| locator.enumerate(&root));
        Run {
            engine: self,
            locator,
            sink,
            paths: Box::new(paths),
            seen: HashSet::new(),
            cache: TitleCache::new(),
            pending: VecDeque::new(),
            cancel: CancelToken::new(),
            stats: RunStats::default(),
            started: false,
            finished: false,
        }
    }

    /// Resolve, extract and cook one anchor. Touches no shared state.
    fn prepare(&self, path: String, anchor: AnchorMatch, locator: &dyn ContentLocator) -> Prepared {
        let Resolution { aggregate, mut notes } =
            self.resolver.resolve(&path, anchor, &self.params, locator);

        let Some(source) = self.extractor.source_path(&aggregate) else {
            notes.push(DiagnosticKind::MissingMetadataSource);
            return Prepared::failed(aggregate, notes);
        };

        let extraction = match self.extractor.extract_path(locator, source) {
            Ok(extraction) => extraction,
            Err(e) => {
                notes.push(DiagnosticKind::ExtractionFailed {
                    path: source.to_string(),
                    message: e.to_string(),
                });
                return Prepared::failed(aggregate, notes);
            }
        };

        notes.extend(
            extraction
                .degraded
                .into_iter()
                .map(|d| DiagnosticKind::DegradedExtraction {
                    key: d.key,
                    reason: d.reason,
                }),
        );
        if extraction.records.is_empty() {
            notes.push(DiagnosticKind::EmptyExtraction {
                path: source.to_string(),
            });
            return Prepared::failed(aggregate, notes);
        }

        let records = extraction
            .records
            .iter()
            .map(|raw| self.cook.cook(raw))
            .collect();
        Prepared {
            aggregate,
            notes,
            records,
            failed: false,
        }
    }
}

/// Output of the independent, parallelisable part of processing one anchor.
struct Prepared {
    aggregate: ArticleAggregate,
    notes: Vec<DiagnosticKind>,
    records: Vec<CookedRecord>,
    failed: bool,
}

impl Prepared {
    fn failed(aggregate: ArticleAggregate, notes: Vec<DiagnosticKind>) -> Self {
        Self {
            aggregate,
            notes,
            records: Vec::new(),
            failed: true,
        }
    }
}

/// A lazy, single-pass sequence of [`Emitted`] articles.
///
/// Rejections and other problems go to the run's [`DiagnosticSink`].
pub struct Run<'a> {
    engine: &'a Engine,
    locator: &'a dyn ContentLocator,
    sink: &'a dyn DiagnosticSink,
    paths: Box<dyn Iterator<Item = String> + 'a>,
    seen: HashSet<String>,
    cache: TitleCache,
    pending: VecDeque<Emitted>,
    cancel: CancelToken,
    stats: RunStats,
    started: bool,
    finished: bool,
}

impl Run<'_> {
    /// Use `token` to stop this run from another thread.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A token that cancels this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// The titles learnt so far.
    pub fn title_cache(&self) -> &TitleCache {
        &self.cache
    }

    fn next_batch(&mut self) -> Vec<(String, AnchorMatch)> {
        let mut batch = Vec::with_capacity(self.engine.batch_size);
        while batch.len() < self.engine.batch_size {
            let Some(path) = self.paths.next() else {
                break;
            };
            self.stats.enumerated += 1;
            // Overlapping roots enumerate some paths twice.
            if !self.seen.insert(path.clone()) {
                continue;
            }
            if let Some(anchor) = self.engine.matcher.match_path(&path) {
                debug!(path = %path, rule = anchor.rule_index, role = %anchor.role, "anchor matched");
                self.stats.anchors += 1;
                batch.push((path, anchor));
            }
        }
        batch
    }

    fn prepare_batch(&self, batch: Vec<(String, AnchorMatch)>) -> Vec<Prepared> {
        let engine = self.engine;
        let locator = self.locator;

        #[cfg(feature = "parallel")]
        if engine.run_in_parallel && batch.len() > 1 {
            use rayon::prelude::*;
            return batch
                .into_par_iter()
                .map(|(path, anchor)| engine.prepare(path, anchor, locator))
                .collect();
        }

        batch
            .into_iter()
            .map(|(path, anchor)| engine.prepare(path, anchor, locator))
            .collect()
    }

    fn report(&self, anchor: &str, kind: DiagnosticKind) {
        self.sink.report(Diagnostic::new(anchor, kind));
    }

    /// Backfill, validate and queue the records of one aggregate.
    fn finalize(&mut self, prepared: Prepared) {
        let Prepared {
            aggregate,
            notes,
            records,
            failed,
        } = prepared;
        let anchor = aggregate.anchor_path();

        for note in notes {
            self.report(anchor, note);
        }
        if failed {
            self.stats.failed += 1;
            return;
        }

        for mut record in records {
            let outcome = self.cache.backfill(&mut record);
            for collision in outcome.collisions {
                self.report(
                    anchor,
                    DiagnosticKind::TitleCollision {
                        key: collision.key,
                        value: collision.value,
                        previous: collision.previous,
                        current: collision.current,
                    },
                );
            }

            match self.engine.validator.should_emit(
                &mut record,
                &aggregate,
                &self.engine.params,
                self.locator,
            ) {
                Ok(()) => {
                    self.pending.push_back(Emitted {
                        record,
                        aggregate: aggregate.clone(),
                    });
                }
                Err(reason) => {
                    debug!(anchor = %anchor, reason = %reason, "record rejected");
                    self.stats.rejected += 1;
                    self.report(anchor, DiagnosticKind::Rejected { reason });
                }
            }
        }
    }

    fn finish(&mut self, cancelled: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.stats.cancelled = cancelled;
        self.pending.clear();
        info!(
            anchors = self.stats.anchors,
            emitted = self.stats.emitted,
            rejected = self.stats.rejected,
            failed = self.stats.failed,
            cancelled,
            "run finished"
        );
    }
}

impl Iterator for Run<'_> {
    type Item = Emitted;

    fn next(&mut self) -> Option<Emitted> {
        if !self.started {
            self.started = true;
            info!(roots = ?self.engine.matcher.roots(), "run started");
        }

        loop {
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish(true);
                return None;
            }
            if let Some(emitted) = self.pending.pop_front() {
                self.stats.emitted += 1;
                return Some(emitted);
            }

            let batch = self.next_batch();
            if batch.is_empty() {
                self.finish(false);
                return None;
            }

            for prepared in self.prepare_batch(batch) {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.finalize(prepared);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MemoryLocator;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
batch_size = 2

[[patterns]]
root = "http://pub.example/"
pattern = '(?P<id>[^/]+)/meta\.ris'
anchor_role = "citation_ris"

[schema]
format = "ris"
source_roles = ["citation_ris"]
article = [{ selector = "T2" }, { selector = "SN" }]

[[cook]]
raw = "T2"
fields = ["journal_title"]

[[cook]]
raw = "SN"
fields = ["issn"]
"#;

    fn ris(journal: Option<&str>, issn: &str) -> String {
        let mut text = String::from("TY  - JOUR\n");
        if let Some(journal) = journal {
            text.push_str(&format!("T2  - {journal}\n"));
        }
        text.push_str(&format!("SN  - {issn}\nER  -\n"));
        text
    }

    fn archive() -> MemoryLocator {
        let mut archive = MemoryLocator::new();
        archive
            .insert("http://pub.example/a/meta.ris", ris(Some("Physics of Fluids"), "1070-6631"))
            .insert("http://pub.example/a/readme.txt", "")
            .insert("http://pub.example/b/meta.ris", ris(None, "1070-6631"))
            .insert("http://pub.example/c/meta.ris", ris(None, "0000-0001"))
            .insert("http://pub.example/d/meta.ris", "<html>gone</html>")
            .insert("http://other.example/e/meta.ris", ris(Some("Elsewhere"), "1"));
        archive
    }

    #[test]
    fn test_run_emits_in_order_with_backfill() {
        let engine = Engine::from_toml_str(CONFIG).unwrap();
        let archive = archive();
        let sink: Mutex<Vec<Diagnostic>> = Mutex::new(Vec::new());

        let mut run = engine.run(&archive, &sink);
        let emitted: Vec<_> = run.by_ref().collect();

        let titles: Vec<_> = emitted
            .iter()
            .map(|e| e.record.get(crate::Field::JournalTitle).unwrap_or_default())
            .collect();
        assert_eq!(
            titles,
            vec!["Physics of Fluids", "Physics of Fluids", "UNKNOWN_TITLE/ISSN=0000-0001"]
        );
        assert_eq!(
            emitted[0].record.get(crate::Field::AccessUrl),
            Some("http://pub.example/a/meta.ris")
        );

        let stats = run.stats();
        assert_eq!(stats.enumerated, 5);
        assert_eq!(stats.anchors, 4);
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.failed, 1);
        assert!(!stats.cancelled);

        drop(run);
        let diagnostics = sink.into_inner().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].anchor, "http://pub.example/d/meta.ris");
        assert!(matches!(diagnostics[0].kind, DiagnosticKind::ExtractionFailed { .. }));
    }

    #[test]
    fn test_sequential_and_parallel_runs_agree() {
        let parallel = Engine::from_toml_str(CONFIG).unwrap();
        let mut config = EngineConfig::from_toml_str(CONFIG).unwrap();
        config.set_run_in_parallel(false).set_batch_size(1);
        let sequential = Engine::new(config).unwrap();

        let archive = archive();
        let sink: Mutex<Vec<Diagnostic>> = Mutex::new(Vec::new());
        let a: Vec<_> = parallel.run(&archive, &sink).collect();
        let b: Vec<_> = sequential.run(&archive, &sink).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled_run_stops() {
        let engine = Engine::from_toml_str(CONFIG).unwrap();
        let archive = archive();
        let sink: Mutex<Vec<Diagnostic>> = Mutex::new(Vec::new());

        let token = CancelToken::new();
        let mut run = engine.run(&archive, &sink).with_cancel(token.clone());
        assert!(run.next().is_some());
        token.cancel();
        assert!(run.next().is_none());
        assert!(run.next().is_none());
        assert!(run.stats().cancelled);
        // The second queued pair of the batch was dropped, not emitted.
        assert_eq!(run.stats().emitted, 1);
    }

    #[test]
    fn test_runs_do_not_share_titles() {
        let engine = Engine::from_toml_str(CONFIG).unwrap();
        let mut archive = MemoryLocator::new();
        archive.insert("http://pub.example/b/meta.ris", ris(None, "1070-6631"));
        let sink: Mutex<Vec<Diagnostic>> = Mutex::new(Vec::new());

        let first: Vec<_> = engine.run(&archive, &sink).collect();
        let second: Vec<_> = engine.run(&archive, &sink).collect();
        assert_eq!(first, second);
        assert_eq!(
            first[0].record.get(crate::Field::JournalTitle),
            Some("UNKNOWN_TITLE/ISSN=1070-6631")
        );
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = EngineConfig::from_toml_str(CONFIG).unwrap();
        config.set_batch_size(0);
        assert!(matches!(
            Engine::new(config).unwrap_err().kind,
            ConfigErrorKind::Empty(_)
        ));
    }

    #[test]
    fn test_aggregate_for_single_path() {
        let engine = Engine::from_toml_str(CONFIG).unwrap();
        let archive = archive();
        assert!(engine.aggregate("http://pub.example/a/readme.txt", &archive).is_none());
        let resolution = engine
            .aggregate("http://pub.example/a/meta.ris", &archive)
            .unwrap();
        assert_eq!(resolution.aggregate.captures().get("id"), Some("a"));
    }
}
