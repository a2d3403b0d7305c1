// ============================================================================
// Isolated execution context — one OS thread per session
// ============================================================================
//
// The worker owns the loaded backend and nothing else. It receives `Request`s
// over one channel and answers with exactly one `Response` per load/process
// request on the other. Every panic raised while loading or processing is
// caught and turned into an error response, so the thread only exits when it
// is told to (Shutdown) or when the interactive side drops its sender.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::backend::{Reconstructor, SharedLoader};
use crate::error::{EraseError, Result};
use crate::ops::executor;
use crate::protocol::{LoadResponse, ProcessRequest, ProcessResponse, Request, Response};

/// Readiness polling budget applied after a loader returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    pub poll_limit: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            poll_limit: 100,
        }
    }
}

/// Interactive-side end of the worker channels.
///
/// Dropping the handle disconnects the worker without waiting for it; a job
/// still running finishes in the background and its response goes nowhere.
pub struct WorkerHandle {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Starts the worker thread. The backend is not loaded until a
    /// `Request::Load` arrives.
    pub fn spawn(loader: SharedLoader, opts: WorkerOptions) -> Result<Self> {
        let (req_tx, req_rx) = mpsc::channel::<Request>();
        let (resp_tx, resp_rx) = mpsc::channel::<Response>();
        let thread = thread::Builder::new()
            .name("retouch-worker".to_string())
            .spawn(move || worker_loop(loader, opts, req_rx, resp_tx))?;
        debug!("worker thread spawned");
        Ok(Self {
            requests: req_tx,
            responses: resp_rx,
            thread: Some(thread),
        })
    }

    /// Queues a request. On failure the worker is gone and the request
    /// (with any buffers it carries) is handed back.
    pub fn send(&self, req: Request) -> std::result::Result<(), Request> {
        self.requests.send(req).map_err(|e| e.0)
    }

    pub fn try_recv(&self) -> std::result::Result<Response, TryRecvError> {
        self.responses.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Response, RecvTimeoutError> {
        self.responses.recv_timeout(timeout)
    }

    /// Asks the worker to exit and waits for it. Blocks for as long as the
    /// current job takes.
    pub fn shutdown(mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // detach; the thread sees Shutdown (or a closed channel) and exits
        let _ = self.requests.send(Request::Shutdown);
    }
}

/// Extracts a printable message from a panic payload.
///
/// Integer payloads (error codes thrown by native code) are kept as their
/// decimal text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(code) = integer_payload(payload) {
        code
    } else {
        "unknown panic payload".to_string()
    }
}

fn integer_payload(payload: &(dyn Any + Send)) -> Option<String> {
    macro_rules! try_int {
        ($($t:ty),*) => {
            $(
                if let Some(n) = payload.downcast_ref::<$t>() {
                    return Some(n.to_string());
                }
            )*
        };
    }
    try_int!(i32, i64, u32, u64, usize, isize, i16, u16, i8, u8);
    None
}

fn worker_loop(
    loader: SharedLoader,
    opts: WorkerOptions,
    requests: Receiver<Request>,
    responses: Sender<Response>,
) {
    let mut backend: Option<Box<dyn Reconstructor>> = None;

    while let Ok(req) = requests.recv() {
        let resp = match req {
            Request::Load => Response::Load(LoadResponse {
                result: load_backend(&loader, &opts, &mut backend),
            }),
            Request::Process(job) => Response::Process(process(backend.as_deref(), job)),
            Request::Shutdown => break,
        };
        if responses.send(resp).is_err() {
            // interactive side is gone
            break;
        }
    }
    debug!("worker thread exiting");
}

fn load_backend(
    loader: &SharedLoader,
    opts: &WorkerOptions,
    slot: &mut Option<Box<dyn Reconstructor>>,
) -> std::result::Result<(), String> {
    if slot.is_some() {
        debug!("backend already resident");
        return Ok(());
    }

    info!(loader = loader.name(), "loading backend");
    let loaded = catch_unwind(AssertUnwindSafe(|| loader.load()))
        .map_err(|p| format!("loader panicked: {}", panic_message(&*p)))??;

    wait_ready(loaded.as_ref(), opts)?;
    *slot = Some(loaded);
    Ok(())
}

/// Bounded fallback for backends that finish initializing after `load`.
fn wait_ready(backend: &dyn Reconstructor, opts: &WorkerOptions) -> std::result::Result<(), String> {
    for attempt in 0..=opts.poll_limit {
        let ready = catch_unwind(AssertUnwindSafe(|| backend.is_ready()))
            .map_err(|p| format!("readiness check panicked: {}", panic_message(&*p)))?;
        if ready {
            if attempt > 0 {
                debug!(polls = attempt, "backend became ready");
            }
            return Ok(());
        }
        if attempt < opts.poll_limit {
            thread::sleep(opts.poll_interval);
        }
    }
    Err(format!(
        "backend not ready after {} polls at {:?}",
        opts.poll_limit, opts.poll_interval
    ))
}

fn process(backend: Option<&dyn Reconstructor>, req: ProcessRequest) -> ProcessResponse {
    let job = req.job;
    let Some(backend) = backend else {
        warn!(%job, "process request before backend load");
        return ProcessResponse {
            job,
            result: Err(EraseError::BackendNotReady.to_string()),
        };
    };

    debug!(%job, width = req.width, height = req.height, "processing job");
    match catch_unwind(AssertUnwindSafe(|| executor::execute(backend, req))) {
        Ok(resp) => resp,
        Err(payload) => {
            let msg = panic_message(&*payload);
            error!(%job, %msg, "reconstruction panicked");
            ProcessResponse {
                job,
                result: Err(format!("reconstruction panicked: {}", msg)),
            }
        }
    }
}
