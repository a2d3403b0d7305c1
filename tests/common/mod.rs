//! Instrumented backend loaders shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, RgbImage};
use retouchfe::backend::{BackendLoader, BuiltinBackend, Reconstructor};
use retouchfe::buffer::{Dims, ImageBuffer, MaskBuffer};
use retouchfe::session::{EraserSession, SessionConfig};
use retouchfe::worker::WorkerOptions;
use retouchfe::{InpaintParams, LoadTicket};

pub const WAIT: Duration = Duration::from_secs(20);

pub fn config() -> SessionConfig {
    SessionConfig {
        job_timeout: Some(WAIT),
        worker: WorkerOptions {
            poll_interval: Duration::from_millis(1),
            poll_limit: 10,
        },
    }
}

pub fn ready_session(loader: Arc<dyn BackendLoader>) -> EraserSession {
    ready_session_with(loader, config())
}

pub fn ready_session_with(loader: Arc<dyn BackendLoader>, config: SessionConfig) -> EraserSession {
    let mut session = EraserSession::new(loader, config);
    let ticket: LoadTicket = session.request_load();
    session.wait_load(ticket, WAIT).expect("backend should load");
    session
}

pub fn solid(dims: Dims, px: [u8; 4]) -> ImageBuffer {
    let data = px.iter().copied().cycle().take(dims.byte_len()).collect();
    ImageBuffer::from_raw(dims, data).unwrap()
}

/// Mask with an "erase" rectangle `[x0, x1) × [y0, y1)`.
pub fn rect_mask(dims: Dims, x0: u32, y0: u32, x1: u32, y1: u32) -> MaskBuffer {
    let mut data = vec![0u8; dims.byte_len()];
    for y in y0..y1 {
        for x in x0..x1 {
            let o = ((y * dims.width + x) * 4) as usize;
            data[o..o + 4].fill(255);
        }
    }
    MaskBuffer::from_raw(dims, data).unwrap()
}

pub fn params() -> InpaintParams {
    InpaintParams::default()
}

// -- counting ---------------------------------------------------------------

/// Counts `load` calls and reconstructions; delegates to the builtin backend.
#[derive(Default)]
pub struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
    pub reconstructions: Arc<AtomicUsize>,
}

struct Counting {
    inner: BuiltinBackend,
    reconstructions: Arc<AtomicUsize>,
}

impl Reconstructor for Counting {
    fn reconstruct(
        &self,
        color: &RgbImage,
        hole: &GrayImage,
        params: &InpaintParams,
    ) -> Result<RgbImage, String> {
        self.reconstructions.fetch_add(1, Ordering::SeqCst);
        self.inner.reconstruct(color, hole, params)
    }
}

impl BackendLoader for CountingLoader {
    fn name(&self) -> &str {
        "counting"
    }

    fn load(&self) -> Result<Box<dyn Reconstructor>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counting {
            inner: BuiltinBackend::new(),
            reconstructions: self.reconstructions.clone(),
        }))
    }
}

// -- failing once -------------------------------------------------------------

/// Fails the first `failures` loads with `reason`, then succeeds.
pub struct FlakyLoader {
    pub reason: String,
    failures: AtomicUsize,
    pub loads: AtomicUsize,
}

impl FlakyLoader {
    pub fn new(reason: &str, failures: usize) -> Self {
        Self {
            reason: reason.to_string(),
            failures: AtomicUsize::new(failures),
            loads: AtomicUsize::new(0),
        }
    }
}

impl BackendLoader for FlakyLoader {
    fn name(&self) -> &str {
        "flaky"
    }

    fn load(&self) -> Result<Box<dyn Reconstructor>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(self.reason.clone());
        }
        Ok(Box::new(BuiltinBackend::new()))
    }
}

// -- gated ----------------------------------------------------------------------

/// Loads and/or reconstructs only once the test opens the matching gate.
/// Dropping a gate's sender opens it for good.
pub struct GatedLoader {
    load_gate: Mutex<Option<Receiver<()>>>,
    job_gate: Mutex<Option<Receiver<()>>>,
    pub loads: AtomicUsize,
}

pub struct Gates {
    pub load: Sender<()>,
    pub job: Sender<()>,
}

impl GatedLoader {
    pub fn new() -> (Self, Gates) {
        let (load_tx, load_rx) = mpsc::channel();
        let (job_tx, job_rx) = mpsc::channel();
        (
            Self {
                load_gate: Mutex::new(Some(load_rx)),
                job_gate: Mutex::new(Some(job_rx)),
                loads: AtomicUsize::new(0),
            },
            Gates {
                load: load_tx,
                job: job_tx,
            },
        )
    }
}

struct Gated {
    inner: BuiltinBackend,
    gate: Option<Receiver<()>>,
}

impl Reconstructor for Gated {
    fn reconstruct(
        &self,
        color: &RgbImage,
        hole: &GrayImage,
        params: &InpaintParams,
    ) -> Result<RgbImage, String> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(WAIT);
        }
        self.inner.reconstruct(color, hole, params)
    }
}

impl BackendLoader for GatedLoader {
    fn name(&self) -> &str {
        "gated"
    }

    fn load(&self) -> Result<Box<dyn Reconstructor>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.load_gate.lock().unwrap().as_ref() {
            let _ = gate.recv_timeout(WAIT);
        }
        Ok(Box::new(Gated {
            inner: BuiltinBackend::new(),
            gate: self.job_gate.lock().unwrap().take(),
        }))
    }
}

// -- crashing -------------------------------------------------------------------

/// Panic payload whose destructor panics too. Dropping it after the first
/// panic was caught takes the whole worker thread down.
struct DoublePanic;

impl Drop for DoublePanic {
    fn drop(&mut self) {
        panic!("payload destructor panicked");
    }
}

struct Crashing;

impl Reconstructor for Crashing {
    fn reconstruct(&self, _: &RgbImage, _: &GrayImage, _: &InpaintParams) -> Result<RgbImage, String> {
        std::panic::panic_any(DoublePanic)
    }
}

/// The first backend it hands out kills its worker on the first job; later
/// loads return the builtin backend.
#[derive(Default)]
pub struct CrashingLoader {
    pub loads: AtomicUsize,
}

impl BackendLoader for CrashingLoader {
    fn name(&self) -> &str {
        "crashing"
    }

    fn load(&self) -> Result<Box<dyn Reconstructor>, String> {
        if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Box::new(Crashing))
        } else {
            Ok(Box::new(BuiltinBackend::new()))
        }
    }
}
