//! Worker pool for generation jobs.
//!
//! A bounded channel feeds a fixed number of tokio tasks that share one
//! receiver. Submitting never waits: a full queue is rejected at once,
//! otherwise a [`JobHandle`] comes back immediately. The job's outcome is
//! only ever visible through the record it drives.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{IntervueError, Result};
use crate::pipeline::Pipeline;

// ============================================================================
// Jobs
// ============================================================================

/// One unit of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Evaluate a pending feedback run.
    Feedback {
        /// Run to evaluate.
        feedback_id: Uuid,
    },
    /// Generate a pending practice batch.
    Practice {
        /// Generation to drive.
        generation_id: Uuid,
    },
}

impl Job {
    /// Id of the record this job drives.
    #[must_use]
    pub const fn record_id(&self) -> Uuid {
        match self {
            Self::Feedback { feedback_id } => *feedback_id,
            Self::Practice { generation_id } => *generation_id,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Feedback { .. } => "feedback",
            Self::Practice { .. } => "practice",
        }
    }
}

/// Returned on submission so callers can track the job by its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    /// Identity of this submission.
    pub job_id: Uuid,
    /// Record the job drives; poll it for the outcome.
    pub record_id: Uuid,
}

struct Envelope {
    job_id: Uuid,
    job: Job,
}

/// A claimed place in the queue. Dropping it unused frees the place.
pub struct JobSlot {
    permit: mpsc::OwnedPermit<Envelope>,
}

impl std::fmt::Debug for JobSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSlot").finish_non_exhaustive()
    }
}

impl JobSlot {
    /// Hands `job` to the workers. Never waits and never fails.
    pub fn submit(self, job: Job) -> JobHandle {
        let handle = JobHandle {
            job_id: Uuid::new_v4(),
            record_id: job.record_id(),
        };
        self.permit.send(Envelope {
            job_id: handle.job_id,
            job,
        });
        debug!(job_id = %handle.job_id, kind = job.kind(), "Job submitted");
        handle
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Bounded queue drained by a fixed pool of workers.
///
/// Dropping every clone of the queue closes the channel; workers finish the
/// job in hand and exit.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Envelope>,
    workers: Arc<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("workers", &self.workers.len())
            .field("capacity", &self.sender.max_capacity())
            .finish()
    }
}

impl JobQueue {
    /// Spawns `workers` tasks (at least one) reading from a channel of
    /// `capacity` slots. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(pipeline: Pipeline, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Envelope>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(Envelope { job_id, job }) = next else {
                            break;
                        };
                        let span = info_span!(
                            "job",
                            worker,
                            %job_id,
                            kind = job.kind(),
                            record_id = %job.record_id()
                        );
                        pipeline.run(job).instrument(span).await;
                    }
                    debug!(worker, "Worker stopped");
                })
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), capacity, "Job queue started");
        Self {
            sender,
            workers: Arc::new(handles),
        }
    }

    /// Claims a queue slot without waiting.
    ///
    /// Reserve before creating the record a job will drive, so a full or
    /// closed queue rejects the request while nothing has been written yet.
    pub fn reserve(&self) -> Result<JobSlot> {
        match self.sender.clone().try_reserve_owned() {
            Ok(permit) => Ok(JobSlot { permit }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(IntervueError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IntervueError::QueueClosed),
        }
    }

    /// Enqueues a job if a slot is free.
    pub fn submit(&self, job: Job) -> Result<JobHandle> {
        Ok(self.reserve()?.submit(job))
    }

    /// Number of worker tasks.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Aborts all workers, closing the queue for every clone.
    pub fn shutdown(&self) {
        for worker in self.workers.iter() {
            worker.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use intervue_provider::MockProvider;

    use super::*;
    use crate::models::{FeedbackRun, GenerationStatus};
    use crate::pipeline::test_support::{arrays_assessment, pipeline};

    async fn wait_for_terminal(pipeline: &Pipeline, id: Uuid) -> FeedbackRun {
        for _ in 0..100 {
            let run = pipeline.store().feedback(id).await.unwrap();
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feedback run {id} never finished");
    }

    #[test]
    fn test_job_record_id_and_kind() {
        let id = Uuid::new_v4();
        let job = Job::Practice { generation_id: id };
        assert_eq!(job.record_id(), id);
        assert_eq!(job.kind(), "practice");
        assert_eq!(Job::Feedback { feedback_id: id }.kind(), "feedback");
    }

    #[tokio::test]
    async fn test_submitted_jobs_reach_terminal_status() {
        let pipeline = pipeline(MockProvider::new());
        let queue = JobQueue::start(pipeline.clone(), 2, 8);
        assert_eq!(queue.worker_count(), 2);

        let owner = Uuid::new_v4();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut assessment = arrays_assessment(owner);
            assessment
                .submit_response(Some("Two pointers, O(n).".to_string()), None)
                .unwrap();
            let assessment_id = assessment.id;
            pipeline.store().insert_assessment(assessment).await;
            let run = pipeline
                .request_feedback(assessment_id, owner, None)
                .await
                .unwrap();

            let handle = queue.submit(Job::Feedback { feedback_id: run.id }).unwrap();
            assert_eq!(handle.record_id, run.id);
            ids.push(run.id);
        }

        for id in ids {
            let run = wait_for_terminal(&pipeline, id).await;
            assert_eq!(run.status, GenerationStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_zero_workers_still_spawns_one() {
        let queue = JobQueue::start(pipeline(MockProvider::new()), 0, 0);
        assert_eq!(queue.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let queue = JobQueue::start(pipeline(MockProvider::new()), 1, 1);
        queue.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = queue
            .submit(Job::Feedback {
                feedback_id: Uuid::new_v4(),
            })
            .unwrap_err();
        assert!(matches!(err, IntervueError::QueueClosed));
    }

    #[tokio::test]
    async fn test_reserve_fails_fast_when_full() {
        let queue = JobQueue::start(pipeline(MockProvider::new()), 1, 1);
        let held = queue.reserve().unwrap();

        let err = queue.reserve().unwrap_err();
        assert!(matches!(err, IntervueError::QueueFull));
        let err = queue
            .submit(Job::Feedback {
                feedback_id: Uuid::new_v4(),
            })
            .unwrap_err();
        assert!(matches!(err, IntervueError::QueueFull));

        drop(held);
        assert!(queue.reserve().is_ok());
    }
}
