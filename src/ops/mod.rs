pub mod executor;
pub mod inpaint;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reconstruction algorithm used for the masked region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InpaintMethod {
    /// Fast marching from the hole boundary inward (weighted neighbourhood average).
    #[default]
    Telea,
    /// Exemplar patches found by PatchMatch, peeled in from the boundary.
    PatchMatch,
}

impl InpaintMethod {
    pub fn label(&self) -> &'static str {
        match self {
            InpaintMethod::Telea => "Telea",
            InpaintMethod::PatchMatch => "PatchMatch",
        }
    }

    pub fn all() -> &'static [InpaintMethod] {
        &[InpaintMethod::Telea, InpaintMethod::PatchMatch]
    }
}

impl FromStr for InpaintMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "telea" | "fmm" => Ok(InpaintMethod::Telea),
            "patchmatch" | "exemplar" => Ok(InpaintMethod::PatchMatch),
            other => Err(format!(
                "unknown inpaint method '{}' (expected telea or patchmatch)",
                other
            )),
        }
    }
}
