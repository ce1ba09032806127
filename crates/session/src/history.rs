//! The per-client history store.
//!
//! Keyed by job id with idempotent upsert: re-applying the same update
//! produces the same final state and never a duplicate entry. That
//! property is what lets the push/poll completion race and repeated
//! reconciliation sweeps converge on a single record per job.

use std::time::Duration;

use atelier_core::history::HistoryEntry;
use atelier_core::types::Timestamp;

/// Ordered history of job outcomes for one client.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Insert or replace the entry with the same job id.
    ///
    /// Idempotent: applying the same entry twice leaves exactly one
    /// copy, equal to a single application.
    pub fn upsert(&mut self, entry: HistoryEntry) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.job_id == entry.job_id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Record the remote prompt id on an existing entry.
    pub fn set_prompt_id(&mut self, job_id: &str, prompt_id: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.job_id == job_id) {
            Some(entry) => {
                entry.prompt_id = Some(prompt_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.job_id == job_id)
    }

    /// Remove the entry for a job id, returning it.
    pub fn remove(&mut self, job_id: &str) -> Option<HistoryEntry> {
        let index = self.entries.iter().position(|entry| entry.job_id == job_id)?;
        Some(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Clones of all entries still marked running.
    pub fn running_entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.is_running())
            .cloned()
            .collect()
    }

    /// Drop terminal entries whose completion is older than `ttl`.
    /// Returns how many were removed. A zero `ttl` disables pruning.
    pub fn prune_expired(&mut self, ttl: Duration, now: Timestamp) -> usize {
        if ttl.is_zero() {
            return 0;
        }
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|entry| match entry.completed_at() {
            Some(completed_at) => now - completed_at <= ttl,
            None => true,
        });
        before - self.entries.len()
    }

    /// Replace the store contents wholesale (snapshot restore).
    pub fn replace_all(&mut self, entries: Vec<HistoryEntry>) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::history::JobOutcome;
    use atelier_core::job::{Job, JobRequest};

    fn entry(job_id: &str) -> HistoryEntry {
        let mut job = Job::from_request(&JobRequest {
            positive_prompt: "a".into(),
            negative_prompt: String::new(),
            seed: 1,
            width: 512,
            height: 512,
        });
        job.id = job_id.to_string();
        HistoryEntry::running(&job)
    }

    fn failed(job_id: &str) -> HistoryEntry {
        entry(job_id).with_outcome(JobOutcome::Failed {
            error: "boom".into(),
            completed_at: chrono::Utc::now(),
        })
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let mut store = HistoryStore::default();
        store.upsert(entry("j1"));
        assert_eq!(store.len(), 1);

        store.upsert(failed("j1"));
        assert_eq!(store.len(), 1);
        assert!(!store.get("j1").unwrap().is_running());
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = HistoryStore::default();
        let update = failed("j1");
        store.upsert(update.clone());
        let after_once: Vec<_> = store.entries().to_vec();

        store.upsert(update);
        assert_eq!(store.entries(), after_once.as_slice());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_keeps_distinct_jobs_apart() {
        let mut store = HistoryStore::default();
        store.upsert(entry("j1"));
        store.upsert(entry("j2"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_prompt_id_updates_existing_entry() {
        let mut store = HistoryStore::default();
        store.upsert(entry("j1"));
        assert!(store.set_prompt_id("j1", "remote-1"));
        assert_eq!(store.get("j1").unwrap().prompt_id.as_deref(), Some("remote-1"));
        assert!(!store.set_prompt_id("missing", "x"));
    }

    #[test]
    fn running_entries_filters_terminal_ones() {
        let mut store = HistoryStore::default();
        store.upsert(entry("j1"));
        store.upsert(failed("j2"));
        let running = store.running_entries();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].job_id, "j1");
    }

    #[test]
    fn remove_returns_entry() {
        let mut store = HistoryStore::default();
        store.upsert(entry("j1"));
        assert!(store.remove("j1").is_some());
        assert!(store.is_empty());
        assert!(store.remove("j1").is_none());
    }

    #[test]
    fn prune_expired_drops_only_old_terminal_entries() {
        let mut store = HistoryStore::default();
        let now = chrono::Utc::now();

        let old = entry("old").with_outcome(JobOutcome::Failed {
            error: "x".into(),
            completed_at: now - chrono::Duration::hours(2),
        });
        let fresh = entry("fresh").with_outcome(JobOutcome::Failed {
            error: "x".into(),
            completed_at: now,
        });
        let running = entry("running");
        store.upsert(old);
        store.upsert(fresh);
        store.upsert(running);

        let removed = store.prune_expired(Duration::from_secs(3600), now);
        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
        assert!(store.get("running").is_some());
    }

    #[test]
    fn zero_ttl_disables_pruning() {
        let mut store = HistoryStore::default();
        store.upsert(failed("j1"));
        assert_eq!(store.prune_expired(Duration::ZERO, chrono::Utc::now()), 0);
        assert_eq!(store.len(), 1);
    }
}
