// Snapshot diff engine - day-over-day classification of absent keys
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDiff<K: Ord> {
    /// Absent today, not absent in the prior snapshot
    pub new: BTreeSet<K>,
    /// Absent before, not absent today and still expected
    pub resumed: BTreeSet<K>,
    /// Absent in both
    pub ongoing: BTreeSet<K>,
    /// Absent before but no longer expected; never reported to operators
    pub retired: BTreeSet<K>,
}

impl<K: Ord> LevelDiff<K> {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.resumed.is_empty()
    }
}

/// Classify every key of `today_absent ∪ prior_absent`. `None` for the prior
/// set is a cold start: everything absent today is new.
pub fn classify<K: Ord + Clone>(
    today_absent: &BTreeSet<K>,
    prior_absent: Option<&BTreeSet<K>>,
    expected: &BTreeSet<K>,
) -> LevelDiff<K> {
    let empty = BTreeSet::new();
    let prior = prior_absent.unwrap_or(&empty);

    let new = today_absent.difference(prior).cloned().collect();
    let ongoing = today_absent.intersection(prior).cloned().collect();

    let (resumed, retired) = prior
        .difference(today_absent)
        .cloned()
        .partition(|k| expected.contains(k));

    LevelDiff {
        new,
        resumed,
        ongoing,
        retired,
    }
}
