/// Outcome of one manager `load()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records decoded and now held in memory.
    pub loaded: usize,
    /// Record files that could not be decoded and were left out.
    pub skipped: usize,
    /// Stale temp files removed before loading.
    pub swept: usize,
}

/// Outcome of [`Registry::initialize`](crate::Registry::initialize).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Managers whose `load()` completed.
    pub managers: usize,
    /// Records loaded across all managers.
    pub loaded: usize,
    /// Record files skipped across all managers.
    pub skipped: usize,
    /// `(manager name, error)` for every manager whose load failed.
    pub failures: Vec<(String, String)>,
}

impl InitReport {
    /// `true` if no manager failed and no record was skipped.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}
