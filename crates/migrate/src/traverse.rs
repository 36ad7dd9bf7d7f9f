#![forbid(unsafe_code)]

use crate::reconcile::{NoteResolution, Reconciler};
use crate::report::Reporter;
use crate::surface::{ItemSurface, SurfaceError};
use np_core::model::ItemSummary;
use np_core::scrape::{is_repeat_of_previous, resolve_creation_date};
use np_storage::StoreError;
use regex::RegexBuilder;

pub(crate) const DEFAULT_MAX_ITEMS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StopReason {
    RepeatDetected,
    CapExceeded,
}

impl StopReason {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            StopReason::RepeatDetected => "end of list detected",
            StopReason::CapExceeded => "iteration cap reached",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TraversalStats {
    pub visited: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duplicate_titles: usize,
}

#[derive(Debug)]
pub(crate) struct TraversalOutcome {
    pub stop: StopReason,
    pub stats: TraversalStats,
}

/// Case-insensitive title matcher for `--skip`. A pattern that compiles
/// as a regex is used as one; anything else degrades to a literal
/// substring, so a pasted title never needs escaping.
pub(crate) enum SkipMatcher {
    Pattern(regex::Regex),
    Literal(String),
}

impl SkipMatcher {
    pub(crate) fn new(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Self::Pattern(re),
            Err(_) => Self::Literal(pattern.to_lowercase()),
        }
    }

    pub(crate) fn matches(&self, title: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(title),
            Self::Literal(needle) => title.to_lowercase().contains(needle),
        }
    }
}

enum ItemError {
    Surface(SurfaceError),
    Store(StoreError),
}

/// Drives the surface across the list exactly once. The list has no
/// length and no per-item identifier, so termination rests on two
/// guards: the repeat-of-previous triple, and a hard iteration cap for
/// the case where the surface misbehaves.
pub(crate) struct TraversalController<'a, S: ItemSurface> {
    surface: S,
    reconciler: Reconciler<'a>,
    reporter: &'a Reporter,
    skip: Option<SkipMatcher>,
    max_items: usize,
}

impl<'a, S: ItemSurface> TraversalController<'a, S> {
    pub(crate) fn new(
        surface: S,
        reconciler: Reconciler<'a>,
        reporter: &'a Reporter,
        skip: Option<&str>,
        max_items: usize,
    ) -> Self {
        Self {
            surface,
            reconciler,
            reporter,
            skip: skip.map(SkipMatcher::new),
            max_items,
        }
    }

    pub(crate) fn run(mut self) -> Result<TraversalOutcome, StoreError> {
        let mut stats = TraversalStats::default();
        let mut prev: Option<ItemSummary> = None;
        let mut skip_pending = self.skip.is_some();

        for _ in 0..self.max_items {
            let summary = match self.surface.summary() {
                Ok(summary) => summary,
                Err(err) => {
                    // No triple to compare against `prev`, so a flaky
                    // summary read cannot fake an end-of-list.
                    self.reporter.error(&format!("summary read failed: {err}"));
                    stats.failed += 1;
                    self.advance();
                    continue;
                }
            };

            if let Some(prev) = prev.as_ref()
                && is_repeat_of_previous(prev, &summary)
            {
                return Ok(TraversalOutcome { stop: StopReason::RepeatDetected, stats });
            }

            stats.visited += 1;
            self.reporter.debug(&format!("item {}: {:?}", stats.visited, summary.title));

            if skip_pending {
                if self.skip.as_ref().is_some_and(|m| m.matches(&summary.title)) {
                    skip_pending = false;
                    self.reporter.note(&format!("resuming at {:?}", summary.title));
                } else {
                    stats.skipped += 1;
                    prev = Some(summary);
                    self.advance();
                    continue;
                }
            }

            match self.process_item(&summary) {
                Ok(resolution) => {
                    stats.processed += 1;
                    if !resolution.collisions.is_empty() {
                        stats.duplicate_titles += 1;
                    }
                }
                Err(ItemError::Surface(err)) => {
                    // Nothing was written for this item; the reconcile
                    // calls only run once every view has been read.
                    self.reporter
                        .error(&format!("item {:?} abandoned: {err}", summary.title));
                    stats.failed += 1;
                }
                Err(ItemError::Store(err)) => return Err(err),
            }

            prev = Some(summary);
            self.advance();
        }

        self.reporter.warning(&format!(
            "iteration cap ({}) reached before the list repeated; stopping",
            self.max_items
        ));
        Ok(TraversalOutcome { stop: StopReason::CapExceeded, stats })
    }

    fn process_item(&mut self, summary: &ItemSummary) -> Result<NoteResolution, ItemError> {
        let detail = self.surface.detail().map_err(ItemError::Surface)?;
        let tags = self.surface.tags().map_err(ItemError::Surface)?;

        let create_date = resolve_creation_date(summary.legacy_created.as_deref(), &detail.created);
        let resolution = self
            .reconciler
            .resolve_note(&summary.title, &create_date)
            .map_err(ItemError::Store)?;
        self.reconciler
            .resolve_folder(&detail.folder, &detail.parent_path, resolution.id)
            .map_err(ItemError::Store)?;
        for tag in &tags {
            self.reconciler
                .resolve_tag(tag, resolution.id)
                .map_err(ItemError::Store)?;
        }
        Ok(resolution)
    }

    fn advance(&mut self) {
        if let Err(err) = self.surface.advance() {
            // A stuck surface re-reads the same item next iteration and
            // the walk ends through the normal repeat detection.
            self.reporter.warning(&format!("advance failed: {err}"));
        }
    }
}
