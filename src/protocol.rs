//! Messages exchanged between the interactive context and the worker.
//!
//! Requests and responses are tagged unions, one variant per message kind, so
//! a new kind cannot be added without every `match` noticing. Pixel payloads
//! are moved (never cloned) into the message that carries them.

use std::fmt;

use uuid::Uuid;

use crate::ops::InpaintMethod;

/// Identifies one processing job; echoed back in its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is plenty for logs
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Which request/response pair a message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Load,
    Process,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Load => f.write_str("load"),
            MessageKind::Process => f.write_str("process"),
        }
    }
}

/// Parameters of the reconstruction for one job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InpaintParams {
    pub method: InpaintMethod,
    /// Neighbourhood radius in native pixels.
    pub radius: u32,
    /// Exemplar side length (PatchMatch only).
    pub patch_size: u32,
    /// Search iterations (PatchMatch only).
    pub iterations: usize,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            method: InpaintMethod::Telea,
            radius: 3,
            patch_size: 7,
            iterations: 3,
        }
    }
}

/// Pixels and parameters for one job. Both buffers are RGBA8 `width×height`.
#[derive(Debug)]
pub struct ProcessRequest {
    pub job: JobId,
    pub image_pixels: Vec<u8>,
    pub mask_pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub params: InpaintParams,
}

#[derive(Debug)]
pub enum Request {
    Load,
    Process(ProcessRequest),
    /// Ask the worker loop to exit after the current message.
    Shutdown,
}

impl Request {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Request::Load => Some(MessageKind::Load),
            Request::Process(_) => Some(MessageKind::Process),
            Request::Shutdown => None,
        }
    }
}

/// Successful reconstruction output.
#[derive(Debug, PartialEq)]
pub struct ProcessedPixels {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, PartialEq)]
pub struct LoadResponse {
    /// `Err` carries the failure reason verbatim.
    pub result: Result<(), String>,
}

#[derive(Debug, PartialEq)]
pub struct ProcessResponse {
    pub job: JobId,
    /// `Err` carries a message already normalized to a string.
    pub result: Result<ProcessedPixels, String>,
}

#[derive(Debug, PartialEq)]
pub enum Response {
    Load(LoadResponse),
    Process(ProcessResponse),
}

impl Response {
    pub fn kind(&self) -> MessageKind {
        match self {
            Response::Load(_) => MessageKind::Load,
            Response::Process(_) => MessageKind::Process,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Load(r) => r.result.is_ok(),
            Response::Process(r) => r.result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn job_id_display_is_short() {
        assert_eq!(JobId::new().to_string().len(), 8);
    }

    #[test]
    fn responses_report_kind_and_outcome() {
        let load = Response::Load(LoadResponse { result: Ok(()) });
        assert_eq!(load.kind(), MessageKind::Load);
        assert!(load.is_success());

        let failed = Response::Process(ProcessResponse {
            job: JobId::new(),
            result: Err("boom".into()),
        });
        assert_eq!(failed.kind(), MessageKind::Process);
        assert!(!failed.is_success());
        assert_eq!(Request::Shutdown.kind(), None);
    }
}
