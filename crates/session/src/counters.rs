//! Process-wide slot counters and the admission check.
//!
//! Two counter groups, each behind its own lock: global queued/running
//! totals, and per-client running counts. Every read-modify-write
//! happens inside the lock, the locks are held only for the arithmetic
//! (never across I/O), and nested acquisition is always global first,
//! then per-user.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use atelier_core::job::JobStatus;

/// Configured concurrency ceilings.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum running jobs per client.
    pub per_user: u32,
    /// Maximum running jobs across all clients; `0` disables the cap.
    pub global_max_running: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_user: 1,
            global_max_running: 0,
        }
    }
}

/// Point-in-time view of the global counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub queued: u32,
    pub running: u32,
}

#[derive(Debug, Default)]
struct GlobalCounts {
    queued: u32,
    running: u32,
}

/// Shared counters spanning the whole server process.
#[derive(Debug, Default)]
pub struct SlotCounters {
    global: Mutex<GlobalCounts>,
    per_user: Mutex<HashMap<String, u32>>,
}

/// Lock acquisition that survives a poisoned mutex: counter state is
/// plain integers, always left consistent, so a panicked holder does
/// not invalidate it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SlotCounters {
    /// Record a newly queued job.
    pub fn note_queued(&self) {
        lock(&self.global).queued += 1;
    }

    /// Attempt the `queued -> running` admission for one client.
    ///
    /// Checks the per-user and global ceilings and, only if both pass,
    /// moves one slot from queued to running and bumps the client's
    /// running count — all under the locks, so two concurrent callers
    /// can never both observe spare capacity. Returns whether the job
    /// was admitted; a failed check changes nothing.
    pub fn try_admit(&self, client_id: &str, limits: &Limits) -> bool {
        let mut global = lock(&self.global);
        if limits.global_max_running > 0 && global.running >= limits.global_max_running {
            return false;
        }

        let mut per_user = lock(&self.per_user);
        let user_running = per_user.entry(client_id.to_string()).or_insert(0);
        if *user_running >= limits.per_user {
            return false;
        }

        *user_running += 1;
        global.running += 1;
        global.queued = global.queued.saturating_sub(1);
        true
    }

    /// Re-register a running slot restored from a snapshot, without
    /// touching the queued count. Used when a session is reloaded with
    /// history entries still marked running.
    pub fn seed_running(&self, client_id: &str) {
        let mut global = lock(&self.global);
        let mut per_user = lock(&self.per_user);
        *per_user.entry(client_id.to_string()).or_insert(0) += 1;
        global.running += 1;
    }

    /// Release the slots a job holds, symmetric to how they were
    /// reserved: a job removed while queued gives back one queued slot;
    /// a job removed while running gives back one global running slot
    /// and one of the client's. Terminal statuses hold nothing.
    pub fn release(&self, client_id: &str, status: JobStatus) {
        match status {
            JobStatus::Queued => {
                let mut global = lock(&self.global);
                global.queued = global.queued.saturating_sub(1);
            }
            JobStatus::Running => {
                let mut global = lock(&self.global);
                global.running = global.running.saturating_sub(1);
                let mut per_user = lock(&self.per_user);
                if let Some(count) = per_user.get_mut(client_id) {
                    *count = count.saturating_sub(1);
                }
            }
            JobStatus::Success | JobStatus::Failed => {}
        }
    }

    /// Current running count for one client.
    pub fn user_running(&self, client_id: &str) -> u32 {
        lock(&self.per_user).get(client_id).copied().unwrap_or(0)
    }

    /// Current global counts.
    pub fn snapshot(&self) -> CounterSnapshot {
        let global = lock(&self.global);
        CounterSnapshot {
            queued: global.queued,
            running: global.running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limits(per_user: u32, global: u32) -> Limits {
        Limits {
            per_user,
            global_max_running: global,
        }
    }

    #[test]
    fn admission_moves_queued_to_running() {
        let counters = SlotCounters::default();
        counters.note_queued();
        assert_eq!(counters.snapshot(), CounterSnapshot { queued: 1, running: 0 });

        assert!(counters.try_admit("alice", &limits(1, 0)));
        assert_eq!(counters.snapshot(), CounterSnapshot { queued: 0, running: 1 });
        assert_eq!(counters.user_running("alice"), 1);
    }

    #[test]
    fn per_user_limit_is_enforced() {
        let counters = SlotCounters::default();
        counters.note_queued();
        counters.note_queued();

        assert!(counters.try_admit("alice", &limits(1, 0)));
        assert!(!counters.try_admit("alice", &limits(1, 0)));
        // A different client is unaffected.
        assert!(counters.try_admit("bob", &limits(1, 0)));
    }

    #[test]
    fn global_limit_is_enforced() {
        let counters = SlotCounters::default();
        for _ in 0..3 {
            counters.note_queued();
        }

        assert!(counters.try_admit("a", &limits(1, 2)));
        assert!(counters.try_admit("b", &limits(1, 2)));
        assert!(!counters.try_admit("c", &limits(1, 2)));
        assert_eq!(counters.snapshot().running, 2);
    }

    #[test]
    fn zero_global_limit_means_unlimited() {
        let counters = SlotCounters::default();
        for i in 0..10 {
            counters.note_queued();
            assert!(counters.try_admit(&format!("user-{i}"), &limits(1, 0)));
        }
        assert_eq!(counters.snapshot().running, 10);
    }

    #[test]
    fn failed_admission_changes_nothing() {
        let counters = SlotCounters::default();
        counters.note_queued();
        assert!(counters.try_admit("alice", &limits(1, 0)));
        let before = counters.snapshot();

        assert!(!counters.try_admit("alice", &limits(1, 0)));
        assert_eq!(counters.snapshot(), before);
        assert_eq!(counters.user_running("alice"), 1);
    }

    #[test]
    fn release_is_symmetric_over_many_cycles() {
        let counters = SlotCounters::default();
        for _ in 0..50 {
            counters.note_queued();
            assert!(counters.try_admit("alice", &limits(1, 0)));
            counters.release("alice", JobStatus::Running);
        }
        assert_eq!(counters.snapshot(), CounterSnapshot { queued: 0, running: 0 });
        assert_eq!(counters.user_running("alice"), 0);
    }

    #[test]
    fn releasing_a_queued_job_only_touches_the_queue() {
        let counters = SlotCounters::default();
        counters.note_queued();
        counters.release("alice", JobStatus::Queued);
        assert_eq!(counters.snapshot(), CounterSnapshot { queued: 0, running: 0 });
    }

    #[test]
    fn release_saturates_at_zero() {
        let counters = SlotCounters::default();
        counters.release("ghost", JobStatus::Running);
        counters.release("ghost", JobStatus::Queued);
        assert_eq!(counters.snapshot(), CounterSnapshot { queued: 0, running: 0 });
    }

    #[test]
    fn seeded_running_slots_release_cleanly() {
        let counters = SlotCounters::default();
        counters.seed_running("alice");
        assert_eq!(counters.snapshot().running, 1);
        assert!(!counters.try_admit("alice", &limits(1, 0)));

        counters.release("alice", JobStatus::Running);
        assert_eq!(counters.snapshot().running, 0);
    }

    #[test]
    fn concurrent_admissions_never_overrun_the_limit() {
        let counters = Arc::new(SlotCounters::default());
        let caps = limits(1, 4);

        for _ in 0..32 {
            counters.note_queued();
        }

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    let user = format!("user-{}", i % 8);
                    counters.try_admit(&user, &caps)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|admitted| *admitted)
            .count();

        assert!(admitted <= 4);
        assert_eq!(counters.snapshot().running as usize, admitted);
    }

    #[test]
    fn concurrent_same_user_admissions_admit_exactly_one() {
        let counters = Arc::new(SlotCounters::default());
        let caps = limits(1, 0);
        counters.note_queued();
        counters.note_queued();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || counters.try_admit("alice", &caps))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(counters.user_running("alice"), 1);
    }
}
