//! RetouchFE: paint over unwanted content and let a worker thread reconstruct it.
//!
//! Pipeline: pointer events → [`coords`] → [`capture::CaptureSurface`] →
//! [`session::EraserSession`] (backend lifecycle + single-job coordinator) →
//! worker thread running [`ops::executor`] → [`render::ResultImage`].

pub mod backend;
pub mod buffer;
pub mod capture;
pub mod cli;
pub mod coordinator;
pub mod coords;
pub mod error;
#[cfg(feature = "gui")]
pub mod gui;
pub mod io;
pub mod logger;
pub mod ops;
pub mod protocol;
pub mod render;
pub mod session;
pub mod settings;
pub mod worker;

pub use backend::{BackendLoader, BackendState, BuiltinLoader, LoadTicket, Reconstructor};
pub use buffer::{Dims, ImageBuffer, MaskBuffer, ResultBuffer};
pub use capture::{BrushStroke, CaptureSurface};
pub use coordinator::{JobHandle, JobState, Rejected};
pub use error::{EraseError, Result};
pub use ops::InpaintMethod;
pub use protocol::InpaintParams;
pub use render::ResultImage;
pub use session::{EraserSession, SessionConfig, SessionEvent};
pub use settings::EraserSettings;
