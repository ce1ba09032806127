//! The live job queue: an ordered record of pending and running jobs.
//!
//! Jobs are appended on submission and removed once terminal; mutation
//! is last-write-wins on matching id. `remove` hands back the removed
//! record so the caller can release exactly the slots its status held.

use atelier_core::job::{Job, JobStatus};

/// Ordered in-process job queue for one client.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
}

impl JobQueue {
    /// Append a job at the back of the queue.
    pub fn add(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Apply a mutation to the job with the given id. Returns whether a
    /// matching job was found.
    pub fn update<F>(&mut self, job_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        match self.jobs.iter_mut().find(|job| job.id == job_id) {
            Some(job) => {
                mutate(job);
                true
            }
            None => false,
        }
    }

    /// Remove the job with the given id, returning it.
    pub fn remove(&mut self, job_id: &str) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.id == job_id)?;
        Some(self.jobs.remove(index))
    }

    /// Borrow a job by id.
    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    /// First job still in `Queued` state, in submission order.
    pub fn next_queued(&self) -> Option<&Job> {
        self.jobs.iter().find(|job| job.status == JobStatus::Queued)
    }

    /// All jobs in submission order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Replace the queue contents wholesale (snapshot restore).
    pub fn replace_all(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::job::JobRequest;

    fn job(prompt: &str) -> Job {
        Job::from_request(&JobRequest {
            positive_prompt: prompt.into(),
            negative_prompt: String::new(),
            seed: 1,
            width: 512,
            height: 512,
        })
    }

    #[test]
    fn add_preserves_submission_order() {
        let mut queue = JobQueue::default();
        let a = job("a");
        let b = job("b");
        queue.add(a.clone());
        queue.add(b.clone());

        let ids: Vec<&str> = queue.jobs().iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
    }

    #[test]
    fn update_mutates_matching_job_only() {
        let mut queue = JobQueue::default();
        let a = job("a");
        let b = job("b");
        queue.add(a.clone());
        queue.add(b.clone());

        assert!(queue.update(&a.id, |j| j.status = JobStatus::Running));
        assert_eq!(queue.get(&a.id).unwrap().status, JobStatus::Running);
        assert_eq!(queue.get(&b.id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn update_unknown_id_reports_false() {
        let mut queue = JobQueue::default();
        assert!(!queue.update("missing", |j| j.status = JobStatus::Failed));
    }

    #[test]
    fn remove_returns_the_removed_record() {
        let mut queue = JobQueue::default();
        let a = job("a");
        queue.add(a.clone());
        queue.update(&a.id, |j| j.status = JobStatus::Running);

        let removed = queue.remove(&a.id).unwrap();
        assert_eq!(removed.status, JobStatus::Running);
        assert!(queue.is_empty());
        assert!(queue.remove(&a.id).is_none());
    }

    #[test]
    fn next_queued_skips_running_jobs() {
        let mut queue = JobQueue::default();
        let a = job("a");
        let b = job("b");
        queue.add(a.clone());
        queue.add(b.clone());
        queue.update(&a.id, |j| j.status = JobStatus::Running);

        assert_eq!(queue.next_queued().unwrap().id, b.id);
    }

    #[test]
    fn next_queued_empty_when_all_running() {
        let mut queue = JobQueue::default();
        let a = job("a");
        queue.add(a.clone());
        queue.update(&a.id, |j| j.status = JobStatus::Running);
        assert!(queue.next_queued().is_none());
    }
}
