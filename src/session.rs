//! One eraser component instance: backend lifecycle, job coordinator and the
//! worker thread they drive.
//!
//! The worker is created on the first load request and torn down with the
//! session (or on `request_reset`). `poll` never blocks and is what an
//! interactive front-end calls every frame; `wait_load` / `wait_job` block
//! with a deadline and serve the CLI and tests.

use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::backend::{BackendLifecycle, BackendState, LoadTicket, SharedLoader};
use crate::buffer::{ImageBuffer, MaskBuffer, ResultBuffer};
use crate::coordinator::{Coordinator, JobHandle, JobState, Rejected};
use crate::error::{EraseError, Result};
use crate::protocol::{InpaintParams, Request, Response};
use crate::settings::EraserSettings;
use crate::worker::{WorkerHandle, WorkerOptions};

/// Reason recorded on the backend when its worker disappears.
pub const WORKER_LOST: &str = "processing context terminated";

/// Upper bound on a single blocking receive so job timeouts are noticed.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub job_timeout: Option<Duration>,
    pub worker: WorkerOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            job_timeout: Some(Duration::from_secs(120)),
            worker: WorkerOptions::default(),
        }
    }
}

impl From<&EraserSettings> for SessionConfig {
    fn from(s: &EraserSettings) -> Self {
        Self {
            job_timeout: s.job_timeout(),
            worker: WorkerOptions {
                poll_interval: Duration::from_millis(s.ready_poll_interval_ms),
                poll_limit: s.ready_poll_limit,
            },
        }
    }
}

/// Something `poll` observed.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    BackendLoaded(std::result::Result<(), EraseError>),
    JobFinished { handle: JobHandle, succeeded: bool },
}

pub struct EraserSession {
    loader: SharedLoader,
    config: SessionConfig,
    worker: Option<WorkerHandle>,
    lifecycle: BackendLifecycle,
    coordinator: Coordinator,
    /// Load requests actually handed to a worker.
    load_requests: u64,
}

impl EraserSession {
    pub fn new(loader: SharedLoader, config: SessionConfig) -> Self {
        let coordinator = Coordinator::new(config.job_timeout);
        Self {
            loader,
            config,
            worker: None,
            lifecycle: BackendLifecycle::new(),
            coordinator,
            load_requests: 0,
        }
    }

    pub fn backend_state(&self) -> &BackendState {
        self.lifecycle.state()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    pub fn job_state(&self, handle: JobHandle) -> Option<JobState> {
        self.coordinator.state(handle)
    }

    pub fn load_requests_sent(&self) -> u64 {
        self.load_requests
    }

    /// Joins the current load attempt or starts one. At most one load request
    /// reaches the worker per attempt; the ticket resolves via `load_outcome`.
    pub fn request_load(&mut self) -> LoadTicket {
        let step = self.lifecycle.begin_load();
        if step.send_request {
            if let Err(e) = self.ensure_worker() {
                error!(error = %e, "could not start processing context");
                self.lifecycle.on_worker_lost(&e.to_string());
                return step.ticket;
            }
            let sent = self
                .worker
                .as_ref()
                .is_some_and(|w| w.send(Request::Load).is_ok());
            if sent {
                self.load_requests += 1;
            } else {
                self.worker_lost();
            }
        }
        step.ticket
    }

    pub fn load_outcome(&self, ticket: LoadTicket) -> Option<std::result::Result<(), EraseError>> {
        self.lifecycle.outcome(ticket)
    }

    /// Submits a job. Rejections hand the buffers back untouched.
    pub fn submit(
        &mut self,
        image: ImageBuffer,
        mask: MaskBuffer,
        params: InpaintParams,
    ) -> std::result::Result<JobHandle, Rejected> {
        let ready = self.lifecycle.is_ready() && self.worker.is_some();
        let (handle, req) = self.coordinator.submit(ready, image, mask, params)?;
        let sent = match self.worker.as_ref() {
            Some(worker) => worker.send(req).is_ok(),
            None => false,
        };
        if sent {
            self.coordinator.mark_running(handle);
        } else {
            self.worker_lost();
        }
        Ok(handle)
    }

    /// Fails the active job locally; a late response is discarded.
    pub fn cancel(&mut self) -> Option<JobHandle> {
        self.coordinator.cancel()
    }

    pub fn take_result(&mut self, handle: JobHandle) -> Option<Result<ResultBuffer>> {
        self.coordinator.take_outcome(handle)
    }

    /// Cancels any job, tears the worker down and returns the backend to Unloaded.
    pub fn request_reset(&mut self) {
        self.coordinator.cancel();
        self.lifecycle.reset();
        if self.worker.take().is_some() {
            info!("processing context released");
        }
    }

    /// Drains every pending response without blocking.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            let Some(worker) = self.worker.as_ref() else {
                break;
            };
            match worker.try_recv() {
                Ok(resp) => self.dispatch(resp, &mut events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    events.extend(self.worker_lost());
                    break;
                }
            }
        }
        if let Some(handle) = self.coordinator.check_timeout(Instant::now()) {
            events.push(SessionEvent::JobFinished {
                handle,
                succeeded: false,
            });
        }
        events
    }

    /// Blocks until the load attempt behind `ticket` resolves or `timeout` passes.
    pub fn wait_load(&mut self, ticket: LoadTicket, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.lifecycle.outcome(ticket) {
                return outcome;
            }
            if self.worker.is_none() {
                return Err(EraseError::WorkerTerminated);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EraseError::BackendLoad(format!(
                    "no load response within {:?}",
                    timeout
                )));
            }
            self.pump(deadline - now);
        }
    }

    /// Blocks until `handle` finishes. `None` waits as long as the job timeout allows.
    pub fn wait_job(&mut self, handle: JobHandle, timeout: Option<Duration>) -> Result<ResultBuffer> {
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        loop {
            if let Some(outcome) = self.coordinator.take_outcome(handle) {
                return outcome;
            }
            if !self
                .coordinator
                .state(handle)
                .is_some_and(|s| s.is_active())
            {
                // finished and already taken, or superseded
                return Err(EraseError::Cancelled);
            }
            let mut slice = WAIT_SLICE;
            if let Some((deadline, limit)) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    self.coordinator.abandon(EraseError::JobTimedOut(limit));
                    self.coordinator.take_outcome(handle);
                    return Err(EraseError::JobTimedOut(limit));
                }
                slice = slice.min(deadline - now);
            }
            self.pump(slice);
        }
    }

    /// Tears down the worker and waits for its thread to exit.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }

    fn pump(&mut self, wait: Duration) {
        let Some(worker) = self.worker.as_ref() else {
            return;
        };
        let mut events = Vec::new();
        match worker.recv_timeout(wait) {
            Ok(resp) => self.dispatch(resp, &mut events),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                self.worker_lost();
                return;
            }
        }
        // pick up anything else that arrived, plus timeouts
        self.poll();
    }

    fn dispatch(&mut self, resp: Response, events: &mut Vec<SessionEvent>) {
        match resp {
            Response::Load(r) => {
                if self.lifecycle.on_load_response(r.result) {
                    let outcome = match self.lifecycle.state() {
                        BackendState::Ready => Ok(()),
                        BackendState::Failed(reason) => Err(EraseError::BackendLoad(reason.clone())),
                        _ => return,
                    };
                    events.push(SessionEvent::BackendLoaded(outcome));
                }
            }
            Response::Process(r) => {
                if let Some(handle) = self.coordinator.on_process_response(r) {
                    events.push(SessionEvent::JobFinished {
                        handle,
                        succeeded: self.coordinator.state(handle) == Some(JobState::Succeeded),
                    });
                }
            }
        }
    }

    fn ensure_worker(&mut self) -> Result<()> {
        if self.worker.is_none() {
            let worker = WorkerHandle::spawn(self.loader.clone(), self.config.worker)?;
            info!(loader = self.loader.name(), "processing context started");
            self.worker = Some(worker);
        }
        Ok(())
    }

    fn worker_lost(&mut self) -> Vec<SessionEvent> {
        warn!("{}", WORKER_LOST);
        self.worker = None;
        let mut events = Vec::new();
        let was_loading = self.lifecycle.is_loading();
        self.lifecycle.on_worker_lost(WORKER_LOST);
        if was_loading {
            events.push(SessionEvent::BackendLoaded(Err(EraseError::BackendLoad(
                WORKER_LOST.to_string(),
            ))));
        }
        if let Some(handle) = self.coordinator.abandon(EraseError::WorkerTerminated) {
            events.push(SessionEvent::JobFinished {
                handle,
                succeeded: false,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::BuiltinLoader;
    use crate::buffer::Dims;

    const WAIT: Duration = Duration::from_secs(10);

    fn session() -> EraserSession {
        EraserSession::new(Arc::new(BuiltinLoader), SessionConfig::default())
    }

    #[test]
    fn submit_before_load_is_refused() {
        let mut s = session();
        let dims = Dims::new(4, 4);
        let img = ImageBuffer::from_raw(dims, vec![0; dims.byte_len()]).unwrap();
        let rejected = s
            .submit(img, MaskBuffer::new(dims), InpaintParams::default())
            .unwrap_err();
        assert_eq!(rejected.error, EraseError::BackendNotReady);
    }

    #[test]
    fn poll_reports_load_completion() {
        let mut s = session();
        let ticket = s.request_load();
        assert_eq!(s.backend_state(), &BackendState::Loading);
        let deadline = Instant::now() + WAIT;
        let mut seen = Vec::new();
        while seen.is_empty() && Instant::now() < deadline {
            seen = s.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(seen, vec![SessionEvent::BackendLoaded(Ok(()))]);
        assert_eq!(s.load_outcome(ticket), Some(Ok(())));
    }

    #[test]
    fn reset_releases_the_worker() {
        let mut s = session();
        let t = s.request_load();
        s.wait_load(t, WAIT).unwrap();
        s.request_reset();
        assert_eq!(s.backend_state(), &BackendState::Unloaded);
        let again = s.request_load();
        assert_ne!(again, t);
        s.wait_load(again, WAIT).unwrap();
        s.shutdown();
    }

    #[test]
    fn wait_job_returns_result() {
        let mut s = session();
        let t = s.request_load();
        s.wait_load(t, WAIT).unwrap();
        let dims = Dims::new(8, 8);
        let img = ImageBuffer::from_raw(dims, vec![200; dims.byte_len()]).unwrap();
        let h = s.submit(img, MaskBuffer::new(dims), InpaintParams::default()).unwrap();
        assert!(s.is_busy());
        let out = s.wait_job(h, Some(WAIT)).unwrap();
        assert_eq!(out.dims(), dims);
        assert!(!s.is_busy());
    }
}
