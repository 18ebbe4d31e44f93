//! Split planning: classify marks and build the page → keep-flag map.
//!
//! The planner is a pure function of the mark catalog and the configuration.
//! Separator pages are dropped from the output; ASN pages start a new
//! document and are kept as its first page. When one page carries both
//! kinds of mark, ASN wins. The precedence is applied as an explicit rule in
//! [`SplitMap::insert`], so the result does not depend on the order in which
//! marks are visited.

use crate::config::SplitterConfig;
use crate::output::Mark;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Page index → "keep this page" flag for every split point.
///
/// `false` marks a separator page (dropped), `true` an ASN page (kept as the
/// first page of a new document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMap {
    pages: BTreeMap<usize, bool>,
}

impl SplitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a split point. A `keep: true` entry is never downgraded to
    /// `false`, whichever order the two arrive in.
    pub fn insert(&mut self, page: usize, keep: bool) {
        let entry = self.pages.entry(page).or_insert(keep);
        *entry |= keep;
    }

    /// Keep flag for `page`, `None` if it is not a split point.
    pub fn get(&self, page: usize) -> Option<bool> {
        self.pages.get(&page).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Highest page index that is a split point.
    pub fn last_page(&self) -> Option<usize> {
        self.pages.keys().next_back().copied()
    }

    /// Split points in ascending page order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.pages.iter().map(|(&page, &keep)| (page, keep))
    }
}

impl FromIterator<(usize, bool)> for SplitMap {
    fn from_iter<I: IntoIterator<Item = (usize, bool)>>(iter: I) -> Self {
        let mut map = SplitMap::new();
        for (page, keep) in iter {
            map.insert(page, keep);
        }
        map
    }
}

/// Turn the mark catalog into a [`SplitMap`].
///
/// An ASN mark on page 0 is never a split point, whatever the configuration.
/// Splitting there would hand the first output straight back to the engine as
/// a document that again starts with an ASN page.
pub fn plan_splits(marks: &[Mark], config: &SplitterConfig) -> SplitMap {
    let mut map = SplitMap::new();

    for mark in marks {
        if mark.is_separator(&config.separator_string) {
            map.insert(mark.page, false);
        }
    }

    if config.enable_asn {
        for mark in marks {
            if mark.page != 0 && mark.is_asn(&config.asn_prefix) {
                map.insert(mark.page, true);
            }
        }
    }

    debug!(
        marks = marks.len(),
        split_points = map.len(),
        asn = config.enable_asn,
        "Split map computed"
    );
    map
}
