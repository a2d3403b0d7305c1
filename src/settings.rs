// ============================================================================
// Persisted eraser settings (settings.json in the platform config directory)
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::{BRUSH_DEFAULT, clamp_brush};
use crate::error::Result;
use crate::ops::InpaintMethod;
use crate::ops::inpaint::MAX_RADIUS;
use crate::protocol::InpaintParams;

const FILE_NAME: &str = "settings.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraserSettings {
    /// Brush diameter in native pixels.
    pub brush_size: f32,
    pub inpaint_radius: u32,
    pub method: InpaintMethod,
    pub patch_size: u32,
    pub patch_iterations: usize,
    /// 0 disables the job timeout.
    pub job_timeout_secs: u64,
    pub ready_poll_interval_ms: u64,
    pub ready_poll_limit: u32,
    /// Where exports go; current directory when unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for EraserSettings {
    fn default() -> Self {
        Self {
            brush_size: BRUSH_DEFAULT,
            inpaint_radius: 3,
            method: InpaintMethod::Telea,
            patch_size: 7,
            patch_iterations: 3,
            job_timeout_secs: 120,
            ready_poll_interval_ms: 50,
            ready_poll_limit: 100,
            output_dir: None,
        }
    }
}

impl EraserSettings {
    /// Platform settings file, e.g. `~/.config/retouchfe/settings.json`.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let base = match std::env::var("XDG_CONFIG_HOME") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
            };
            return Some(base.join("retouchfe").join(FILE_NAME));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("RetouchFE").join(FILE_NAME));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("RetouchFE")
                    .join(FILE_NAME),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(FILE_NAME)))
        }
    }

    /// Loads from the platform path, falling back to defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Reads `path`. Missing files give defaults; corrupt ones are logged and
    /// also give defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(s) => s.clamped(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings file unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Pulls every field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.brush_size = clamp_brush(self.brush_size);
        self.inpaint_radius = self.inpaint_radius.clamp(1, MAX_RADIUS);
        self.patch_size = self.patch_size.clamp(3, 31) | 1;
        self.patch_iterations = self.patch_iterations.clamp(1, 16);
        self.ready_poll_limit = self.ready_poll_limit.max(1);
        self
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn inpaint_params(&self) -> InpaintParams {
        InpaintParams {
            method: self.method,
            radius: self.inpaint_radius,
            patch_size: self.patch_size,
            iterations: self.patch_iterations,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);
        let s = EraserSettings {
            brush_size: 33.0,
            method: InpaintMethod::PatchMatch,
            job_timeout_secs: 0,
            output_dir: Some(PathBuf::from("/tmp/out")),
            ..Default::default()
        };
        s.save_to(&path).unwrap();
        let back = EraserSettings::load_from(&path);
        assert_eq!(back, s);
        assert_eq!(back.job_timeout(), None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, r#"{ "inpaint_radius": 5 }"#).unwrap();
        let s = EraserSettings::load_from(&path);
        assert_eq!(s.inpaint_radius, 5);
        assert_eq!(s.brush_size, BRUSH_DEFAULT);
        assert_eq!(s.job_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(EraserSettings::load_from(&path), EraserSettings::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "brush_size": 500, "inpaint_radius": 99, "patch_size": 4 }"#,
        )
        .unwrap();
        let s = EraserSettings::load_from(&path);
        assert_eq!(s.brush_size, 50.0);
        assert_eq!(s.inpaint_radius, MAX_RADIUS);
        assert_eq!(s.patch_size, 5);
    }
}
