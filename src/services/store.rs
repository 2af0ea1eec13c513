use std::collections::{HashMap, VecDeque};

use crate::models::job::{Job, JobId, JobStatus, JobSummary, NewImage, Transition};
use crate::models::metadata::ImagePayload;
use crate::models::stats::QueueStats;

/// A job moved from the queue into flight, with the payload to analyze.
#[derive(Debug, PartialEq, Eq)]
pub struct Admission {
    pub job_id: JobId,
    pub filename: String,
    pub payload: ImagePayload,
}

/// In-memory home of every job in the session.
///
/// Holds the pending queue and the in-flight counter alongside the jobs so
/// that admission, settlement and clearing each happen in one `&mut` step.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
    order: Vec<JobId>,
    queue: VecDeque<JobId>,
    in_flight: usize,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one pending job per image and queues them in input order.
    pub fn submit(&mut self, images: Vec<NewImage>) -> Vec<JobSummary> {
        let mut created = Vec::with_capacity(images.len());

        for image in images {
            let job = Job::new(image);
            let id = job.id();
            created.push(job.summary());

            self.order.push(id);
            self.queue.push_back(id);
            self.jobs.insert(id, job);
        }

        tracing::debug!(
            submitted = created.len(),
            queue_depth = self.queue.len(),
            "Jobs enqueued"
        );
        created
    }

    /// Applies one state-machine transition.
    ///
    /// Admission returns the [`Admission`] carrying the payload and removes the
    /// job from the queue. Terminal transitions release an in-flight slot.
    pub fn transition(
        &mut self,
        job_id: JobId,
        transition: Transition,
    ) -> Result<Option<Admission>, StoreError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::UnknownJob(job_id))?;

        if !job.can_apply(&transition) {
            return Err(StoreError::IllegalTransition {
                job_id,
                from: job.status(),
                to: transition.target(),
            });
        }

        match transition {
            Transition::Admit => {
                if let Some(pos) = self.queue.iter().position(|id| *id == job_id) {
                    self.queue.remove(pos);
                }
                let filename = job.filename().to_string();
                let payload = job
                    .apply(Transition::Admit)
                    .ok_or(StoreError::PayloadConsumed(job_id))?;
                self.in_flight += 1;

                Ok(Some(Admission {
                    job_id,
                    filename,
                    payload,
                }))
            }
            terminal => {
                job.apply(terminal);
                self.in_flight = self.in_flight.saturating_sub(1);
                Ok(None)
            }
        }
    }

    /// Admits the oldest queued job, if any.
    pub fn admit_next(&mut self) -> Option<Admission> {
        while let Some(job_id) = self.queue.front().copied() {
            match self.transition(job_id, Transition::Admit) {
                Ok(admission) => return admission,
                Err(e) => {
                    // Queue only ever holds pending ids.
                    tracing::warn!(job_id = %job_id, error = %e, "Dropping unadmittable queue entry");
                    if self.queue.front() == Some(&job_id) {
                        self.queue.pop_front();
                    }
                }
            }
        }
        None
    }

    /// Discards every job, the queue and the in-flight count.
    ///
    /// Returns the number of jobs discarded. Dropping the jobs releases their
    /// previews.
    pub fn clear(&mut self) -> usize {
        let discarded = self.jobs.len();
        let abandoned = self.in_flight;
        let released_bytes: usize = self
            .jobs
            .values()
            .map(|job| job.preview().size_bytes())
            .sum();

        self.jobs.clear();
        self.order.clear();
        self.queue.clear();
        self.in_flight = 0;

        tracing::info!(
            discarded,
            abandoned_in_flight = abandoned,
            released_preview_bytes = released_bytes,
            "Job store cleared"
        );
        discarded
    }

    pub fn get(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    /// Jobs in submission order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Queued ids, next to be admitted first.
    pub fn queued(&self) -> impl Iterator<Item = JobId> + '_ {
        self.queue.iter().copied()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Nothing queued and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.in_flight == 0 && self.queue.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_statuses(self.jobs.values().map(Job::status))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown job {0}")]
    UnknownJob(JobId),

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Payload for job {0} was already consumed")]
    PayloadConsumed(JobId),
}
