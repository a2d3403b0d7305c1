// ============================================================================
// Processing backend — loader traits and the load lifecycle state machine
// ============================================================================
//
// The backend is the heavy part of the pipeline. It is loaded lazily, inside
// the worker thread, exactly once per worker. The interactive side only ever
// sees `BackendLifecycle`, a plain state machine that decides whether a load
// request has to be sent and hands out tickets that resolve when the worker's
// load response arrives.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use tracing::{debug, info, warn};

use crate::error::EraseError;
use crate::ops::InpaintMethod;
use crate::ops::inpaint::{MAX_RADIUS, TeleaKernel, fill_patchmatch, fill_telea};
use crate::protocol::InpaintParams;

// -- Backend traits -------------------------------------------------------

/// A loaded reconstruction backend. Lives on the worker thread only.
pub trait Reconstructor: Send {
    /// Whether internal initialization has finished. Backends that finish
    /// asynchronously after `load` returns report `false` until ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Fills every pixel where `hole > 0`; must return an image of the same size.
    fn reconstruct(
        &self,
        color: &RgbImage,
        hole: &GrayImage,
        params: &InpaintParams,
    ) -> Result<RgbImage, String>;
}

/// Produces a backend. Called on the worker thread.
pub trait BackendLoader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Loads the backend; `Err` carries the reason verbatim to the caller.
    fn load(&self) -> Result<Box<dyn Reconstructor>, String>;
}

/// The bundled CPU backend: fast marching and PatchMatch.
pub struct BuiltinBackend {
    /// Index `r - 1` holds the kernel for radius `r`.
    kernels: Vec<TeleaKernel>,
}

impl BuiltinBackend {
    pub fn new() -> Self {
        Self {
            kernels: (1..=MAX_RADIUS).map(TeleaKernel::new).collect(),
        }
    }

    fn kernel(&self, radius: u32) -> &TeleaKernel {
        let r = radius.clamp(1, MAX_RADIUS) as usize;
        &self.kernels[r - 1]
    }
}

impl Default for BuiltinBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor for BuiltinBackend {
    fn reconstruct(
        &self,
        color: &RgbImage,
        hole: &GrayImage,
        params: &InpaintParams,
    ) -> Result<RgbImage, String> {
        if color.dimensions() != hole.dimensions() {
            return Err(format!(
                "colour is {:?} but hole mask is {:?}",
                color.dimensions(),
                hole.dimensions()
            ));
        }
        let kernel = self.kernel(params.radius);
        Ok(match params.method {
            InpaintMethod::Telea => fill_telea(color, hole, kernel),
            InpaintMethod::PatchMatch => {
                fill_patchmatch(color, hole, params.patch_size, params.iterations, kernel)
            }
        })
    }
}

/// Loader for [`BuiltinBackend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinLoader;

impl BackendLoader for BuiltinLoader {
    fn name(&self) -> &str {
        "builtin"
    }

    fn load(&self) -> Result<Box<dyn Reconstructor>, String> {
        Ok(Box::new(BuiltinBackend::new()))
    }
}

/// Shared handle to a loader; the session respawns workers from it.
pub type SharedLoader = Arc<dyn BackendLoader>;

// -- Lifecycle ------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

impl BackendState {
    pub fn label(&self) -> &'static str {
        match self {
            BackendState::Unloaded => "unloaded",
            BackendState::Loading => "loading",
            BackendState::Ready => "ready",
            BackendState::Failed(_) => "failed",
        }
    }
}

/// Identifies the load attempt a `request_load` call joined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket {
    attempt: u64,
}

/// What the caller must do after `begin_load`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadStep {
    pub ticket: LoadTicket,
    /// `true` only for the call that started a new attempt: send exactly one
    /// load request to the worker.
    pub send_request: bool,
}

/// Unloaded → Loading → Ready | Failed(reason); Failed → Loading on retry.
#[derive(Debug)]
pub struct BackendLifecycle {
    state: BackendState,
    attempt: u64,
    outcomes: BTreeMap<u64, Result<(), String>>,
}

impl Default for BackendLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendLifecycle {
    pub fn new() -> Self {
        Self {
            state: BackendState::Unloaded,
            attempt: 0,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> &BackendState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == BackendState::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state == BackendState::Loading
    }

    /// Joins the current attempt or starts a new one.
    pub fn begin_load(&mut self) -> LoadStep {
        match self.state {
            BackendState::Ready | BackendState::Loading => LoadStep {
                ticket: LoadTicket {
                    attempt: self.attempt,
                },
                send_request: false,
            },
            BackendState::Unloaded | BackendState::Failed(_) => {
                self.attempt += 1;
                self.state = BackendState::Loading;
                info!(attempt = self.attempt, "backend load started");
                LoadStep {
                    ticket: LoadTicket {
                        attempt: self.attempt,
                    },
                    send_request: true,
                }
            }
        }
    }

    /// Applies the worker's load response. Returns `false` when no load was
    /// pending and the response was discarded.
    pub fn on_load_response(&mut self, result: Result<(), String>) -> bool {
        if self.state != BackendState::Loading {
            warn!(state = self.state.label(), "unexpected load response discarded");
            return false;
        }
        match &result {
            Ok(()) => {
                info!(attempt = self.attempt, "backend ready");
                self.state = BackendState::Ready;
            }
            Err(reason) => {
                warn!(attempt = self.attempt, %reason, "backend load failed");
                self.state = BackendState::Failed(reason.clone());
            }
        }
        self.outcomes.insert(self.attempt, result);
        true
    }

    /// Outcome of the attempt behind `ticket`, once it is known.
    pub fn outcome(&self, ticket: LoadTicket) -> Option<Result<(), EraseError>> {
        self.outcomes
            .get(&ticket.attempt)
            .map(|r| r.clone().map_err(EraseError::BackendLoad))
    }

    /// The worker went away: an in-flight load fails, a ready backend is lost.
    pub fn on_worker_lost(&mut self, reason: &str) {
        match self.state {
            BackendState::Loading => {
                self.on_load_response(Err(reason.to_string()));
            }
            BackendState::Ready => {
                debug!("ready backend lost with its worker");
                self.state = BackendState::Failed(reason.to_string());
            }
            _ => {}
        }
    }

    /// Explicit reset back to Unloaded. Tickets already resolved keep their outcome;
    /// a load that was in flight resolves as failed.
    pub fn reset(&mut self) {
        if self.state == BackendState::Loading {
            self.outcomes
                .insert(self.attempt, Err("backend reset while loading".to_string()));
        }
        self.state = BackendState::Unloaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_starts_loading() {
        let mut lc = BackendLifecycle::new();
        let step = lc.begin_load();
        assert!(step.send_request);
        assert_eq!(lc.state(), &BackendState::Loading);
        assert_eq!(lc.outcome(step.ticket), None);
    }

    #[test]
    fn concurrent_requests_share_one_attempt() {
        let mut lc = BackendLifecycle::new();
        let a = lc.begin_load();
        let b = lc.begin_load();
        assert!(a.send_request);
        assert!(!b.send_request);
        assert_eq!(a.ticket, b.ticket);

        assert!(lc.on_load_response(Ok(())));
        assert_eq!(lc.outcome(a.ticket), Some(Ok(())));
        assert_eq!(lc.outcome(b.ticket), Some(Ok(())));
    }

    #[test]
    fn ready_resolves_immediately() {
        let mut lc = BackendLifecycle::new();
        lc.begin_load();
        lc.on_load_response(Ok(()));
        let step = lc.begin_load();
        assert!(!step.send_request);
        assert_eq!(lc.outcome(step.ticket), Some(Ok(())));
    }

    #[test]
    fn failure_is_verbatim_and_retryable() {
        let mut lc = BackendLifecycle::new();
        let first = lc.begin_load();
        lc.on_load_response(Err("network error".into()));
        assert_eq!(lc.state(), &BackendState::Failed("network error".into()));
        assert_eq!(
            lc.outcome(first.ticket),
            Some(Err(EraseError::BackendLoad("network error".into())))
        );

        let retry = lc.begin_load();
        assert!(retry.send_request);
        assert_ne!(retry.ticket, first.ticket);
        lc.on_load_response(Ok(()));
        assert!(lc.is_ready());
        // the first attempt still reports its own failure
        assert!(matches!(lc.outcome(first.ticket), Some(Err(_))));
    }

    #[test]
    fn stray_load_response_is_ignored() {
        let mut lc = BackendLifecycle::new();
        assert!(!lc.on_load_response(Ok(())));
        assert_eq!(lc.state(), &BackendState::Unloaded);
    }

    #[test]
    fn reset_and_worker_loss() {
        let mut lc = BackendLifecycle::new();
        let t = lc.begin_load();
        lc.on_worker_lost("gone");
        assert_eq!(lc.state(), &BackendState::Failed("gone".into()));
        assert!(matches!(lc.outcome(t.ticket), Some(Err(_))));

        lc.begin_load();
        lc.on_load_response(Ok(()));
        lc.reset();
        assert_eq!(lc.state(), &BackendState::Unloaded);
        assert!(lc.begin_load().send_request);
    }

    #[test]
    fn builtin_backend_checks_sizes() {
        let backend = BuiltinBackend::new();
        let color = RgbImage::new(4, 4);
        let hole = GrayImage::new(3, 4);
        assert!(backend
            .reconstruct(&color, &hole, &InpaintParams::default())
            .is_err());
    }
}
