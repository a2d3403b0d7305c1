//! Single-job coordinator.
//!
//! Lives entirely on the interactive side. It validates a submission, turns
//! the moved buffers into a `Request::Process`, and correlates the worker's
//! response back to the job by id. It never touches a channel itself; the
//! session sends what `submit` returns.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::buffer::{Dims, ImageBuffer, MaskBuffer, ResultBuffer};
use crate::error::EraseError;
use crate::protocol::{InpaintParams, JobId, ProcessRequest, ProcessResponse, Request};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }
}

#[derive(Debug)]
pub struct Job {
    id: JobId,
    dims: Dims,
    state: JobState,
    submitted_at: Instant,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// Caller's reference to a submitted job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: JobId,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }
}

/// A refused submission. The buffers come back untouched.
#[derive(Debug)]
pub struct Rejected {
    pub error: EraseError,
    pub image: ImageBuffer,
    pub mask: MaskBuffer,
}

pub struct Coordinator {
    current: Option<Job>,
    outcomes: HashMap<JobId, Result<ResultBuffer, EraseError>>,
    timeout: Option<Duration>,
}

impl Coordinator {
    /// `timeout` of `None` lets a job run indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            current: None,
            outcomes: HashMap::new(),
            timeout,
        }
    }

    pub fn current(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.current.as_ref().is_some_and(|j| j.state.is_active())
    }

    /// State of `handle`'s job if it is the most recent one.
    pub fn state(&self, handle: JobHandle) -> Option<JobState> {
        self.current
            .as_ref()
            .filter(|j| j.id == handle.id)
            .map(|j| j.state)
    }

    /// Validates and packages a job. Nothing is sent on rejection.
    pub fn submit(
        &mut self,
        backend_ready: bool,
        image: ImageBuffer,
        mask: MaskBuffer,
        params: InpaintParams,
    ) -> Result<(JobHandle, Request), Rejected> {
        let error = if !backend_ready {
            Some(EraseError::BackendNotReady)
        } else if self.is_busy() {
            Some(EraseError::JobInFlight)
        } else if image.dims() != mask.dims() {
            Some(EraseError::DimensionMismatch {
                image: image.dims(),
                mask: mask.dims(),
            })
        } else {
            None
        };
        if let Some(error) = error {
            warn!(%error, "submission rejected");
            return Err(Rejected { error, image, mask });
        }

        let dims = image.dims();
        let id = JobId::new();
        // outcomes nobody took (e.g. a cancel) are superseded by the new job
        if !self.outcomes.is_empty() {
            debug!(dropped = self.outcomes.len(), "pruning untaken outcomes");
            self.outcomes.clear();
        }
        self.current = Some(Job {
            id,
            dims,
            state: JobState::Queued,
            submitted_at: Instant::now(),
        });
        info!(job = %id, %dims, method = params.method.label(), "job queued");

        let req = Request::Process(ProcessRequest {
            job: id,
            image_pixels: image.into_raw(),
            mask_pixels: mask.into_raw(),
            width: dims.width,
            height: dims.height,
            params,
        });
        Ok((JobHandle { id }, req))
    }

    /// The request has been handed to the worker.
    pub fn mark_running(&mut self, handle: JobHandle) {
        if let Some(job) = self.current.as_mut() {
            if job.id == handle.id && job.state == JobState::Queued {
                job.state = JobState::Running;
                job.submitted_at = Instant::now();
            }
        }
    }

    /// Applies a process response. Returns the handle of the job it
    /// resolved, or `None` when the response was discarded.
    pub fn on_process_response(&mut self, resp: ProcessResponse) -> Option<JobHandle> {
        let Some(job) = self.current.as_ref() else {
            warn!(job = %resp.job, "process response with no job submitted; discarded");
            return None;
        };
        if job.id != resp.job {
            warn!(job = %resp.job, current = %job.id, "response for unknown job discarded");
            return None;
        }
        if !job.state.is_active() {
            debug!(job = %resp.job, "late response for finished job discarded");
            return None;
        }

        let dims = job.dims;
        let outcome = match resp.result {
            Ok(px) if Dims::new(px.width, px.height) != dims => Err(EraseError::Execution(format!(
                "malformed response: {}x{} result for a {} job",
                px.width, px.height, dims
            ))),
            Ok(px) => ResultBuffer::from_raw(dims, px.pixels)
                .map_err(|e| EraseError::Execution(format!("malformed response: {}", e))),
            Err(reason) => Err(EraseError::Execution(reason)),
        };
        self.finish(outcome)
    }

    /// Fails the running job once it has exceeded the configured timeout.
    pub fn check_timeout(&mut self, now: Instant) -> Option<JobHandle> {
        let limit = self.timeout?;
        let job = self.current.as_ref()?;
        if job.state != JobState::Running || now.saturating_duration_since(job.submitted_at) < limit {
            return None;
        }
        self.finish(Err(EraseError::JobTimedOut(limit)))
    }

    /// Abandons the job locally; the worker may still finish it.
    pub fn cancel(&mut self) -> Option<JobHandle> {
        self.abandon(EraseError::Cancelled)
    }

    /// Fails the active job with `error`, if there is one.
    pub fn abandon(&mut self, error: EraseError) -> Option<JobHandle> {
        if !self.is_busy() {
            return None;
        }
        self.finish(Err(error))
    }

    /// Takes the outcome once the job is finished. Each outcome is handed out
    /// once, and only until the next job is accepted.
    pub fn take_outcome(&mut self, handle: JobHandle) -> Option<Result<ResultBuffer, EraseError>> {
        self.outcomes.remove(&handle.id)
    }

    /// Finished outcomes still waiting to be taken.
    pub fn pending_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    fn finish(&mut self, outcome: Result<ResultBuffer, EraseError>) -> Option<JobHandle> {
        let job = self.current.as_mut()?;
        job.state = if outcome.is_ok() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        let id = job.id;
        match &outcome {
            Ok(_) => info!(job = %id, elapsed = ?job.submitted_at.elapsed(), "job succeeded"),
            Err(error) => warn!(job = %id, %error, "job failed"),
        }
        self.outcomes.insert(id, outcome);
        Some(JobHandle { id })
    }
}
