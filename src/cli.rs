// ============================================================================
// RetouchFE CLI — headless watermark removal via command-line arguments
// ============================================================================
//
// Usage examples:
//   retouchfe --input photo.png --mask mask.png --output clean.png
//   retouchfe -i photo.jpg --stroke "40,40 120,40" --brush 18 --output-dir out/
//   retouchfe -i photo.jpg --display 800x600 --stroke "10,10 90,12" --method patchmatch
//
// No GUI is opened in CLI mode. The backend still runs on its own worker
// thread; this driver just blocks on the session until the job resolves.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::debug;

use crate::backend::BuiltinLoader;
use crate::buffer::{Dims, ImageBuffer, MaskBuffer};
use crate::capture::{BrushStroke, CaptureSurface, clamp_brush};
use crate::coords::{self, Point, Size};
use crate::error::{EraseError, Result};
use crate::io;
use crate::logger;
use crate::ops::InpaintMethod;
use crate::render::ResultImage;
use crate::session::{EraserSession, SessionConfig};
use crate::settings::EraserSettings;

/// Load timeout when the job timeout is disabled.
const DEFAULT_LOAD_WAIT: Duration = Duration::from_secs(60);

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// RetouchFE headless watermark remover.
///
/// Paints a mask (from a mask image or from strokes), reconstructs the
/// masked pixels and writes the result as PNG. No GUI is required.
#[derive(Parser, Debug)]
#[command(
    name = "retouchfe",
    about = "RetouchFE headless mask-guided inpainting",
    long_about = "Remove watermarks or other unwanted content by reconstructing the\n\
                  pixels under a mask. The mask is either an image of the same size\n\
                  (any pixel brighter than the threshold is erased) or one or more\n\
                  brush strokes given as point lists.\n\n\
                  Example:\n  \
                  retouchfe --input photo.png --stroke \"40,40 120,40\" --output clean.png"
)]
pub struct CliArgs {
    /// Input image (PNG, JPEG, WEBP, BMP).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Mask image with the same dimensions as the input.
    #[arg(short, long, value_name = "FILE", conflicts_with = "stroke")]
    pub mask: Option<PathBuf>,

    /// Brush stroke as space-separated "x,y" points. Repeatable.
    #[arg(short, long, value_name = "\"x,y x,y ...\"", required_unless_present = "mask")]
    pub stroke: Vec<String>,

    /// Brush diameter in native pixels (5–50).
    #[arg(short, long, value_name = "PX")]
    pub brush: Option<f32>,

    /// Interpret stroke points in a display of this size (e.g. 800x600)
    /// instead of native pixels.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub display: Option<Size>,

    /// Neighbourhood radius of the reconstruction (1–16).
    #[arg(short, long, value_name = "PX")]
    pub radius: Option<u32>,

    /// Reconstruction method: telea or patchmatch.
    #[arg(long, value_name = "METHOD")]
    pub method: Option<InpaintMethod>,

    /// Output file path.
    #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,

    /// Output directory; the file gets a timestamped name.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Job timeout in seconds (0 waits forever).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log backend and job progress to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating a window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i" || a.starts_with("--input="))
    }

    /// Settings from disk with this run's overrides applied.
    pub fn settings(&self) -> EraserSettings {
        self.apply_to(EraserSettings::load())
    }

    /// Applies this run's overrides on top of `base`.
    pub fn apply_to(&self, base: EraserSettings) -> EraserSettings {
        let mut s = base;
        if let Some(b) = self.brush {
            s.brush_size = b;
        }
        if let Some(r) = self.radius {
            s.inpaint_radius = r;
        }
        if let Some(m) = self.method {
            s.method = m;
        }
        if let Some(t) = self.timeout {
            s.job_timeout_secs = t;
        }
        if let Some(dir) = &self.output_dir {
            s.output_dir = Some(dir.clone());
        }
        s.clamped()
    }
}

/// Parses `WxH` (also accepts `W×H` and `W,H`).
pub fn parse_size(s: &str) -> std::result::Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X', '×', ','])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: f32 = w.trim().parse().map_err(|_| format!("bad width in '{}'", s))?;
    let h: f32 = h.trim().parse().map_err(|_| format!("bad height in '{}'", s))?;
    let size = Size::new(w, h);
    if !size.is_measured() {
        return Err(format!("display size must be positive, got '{}'", s));
    }
    Ok(size)
}

/// Parses `"x,y x,y ..."` into points.
pub fn parse_points(s: &str) -> std::result::Result<Vec<Point>, String> {
    s.split_whitespace()
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("expected x,y, got '{}'", pair))?;
            let x: f32 = x.parse().map_err(|_| format!("bad x in '{}'", pair))?;
            let y: f32 = y.parse().map_err(|_| format!("bad y in '{}'", pair))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one removal and return an OS exit code.
/// `0` = result written, `1` = anything failed.
pub fn run(args: CliArgs) -> ExitCode {
    logger::init_stderr(args.verbose);
    let start = Instant::now();

    match run_one(&args, args.settings()) {
        Ok(path) => {
            if args.verbose {
                println!(
                    "{} ({:.0}ms)",
                    path.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            } else {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

fn run_one(args: &CliArgs, settings: EraserSettings) -> Result<PathBuf> {
    let source = io::load_image(&args.input)?;
    let dims = Dims::new(source.width(), source.height());

    let mask = match &args.mask {
        Some(path) => io::load_mask(path, dims)?,
        None => rasterize_strokes(&args.stroke, settings.brush_size, args.display, dims)?,
    };
    if mask.is_blank() {
        debug!("mask is empty; the input will be returned unchanged");
    }

    let mut session = EraserSession::new(Arc::new(BuiltinLoader), SessionConfig::from(&settings));
    let ticket = session.request_load();
    session.wait_load(ticket, settings.job_timeout().unwrap_or(DEFAULT_LOAD_WAIT))?;

    let image = ImageBuffer::from_rgba(source)?;
    let handle = session
        .submit(image, mask, settings.inpaint_params())
        .map_err(|rejected| rejected.error)?;
    let result = session.wait_job(handle, settings.job_timeout())?;
    session.shutdown();

    let rendered = ResultImage::from_buffer(result)?;
    match &args.output {
        Some(path) => {
            rendered.save_png(path)?;
            Ok(path.clone())
        }
        None => rendered.export_to(&settings.output_dir()),
    }
}

/// Replays command-line strokes onto a fresh capture surface.
fn rasterize_strokes(
    strokes: &[String],
    brush: f32,
    display: Option<Size>,
    dims: Dims,
) -> Result<MaskBuffer> {
    let native = Size::from(dims);
    let mut surface = CaptureSurface::new(dims);
    for spec in strokes {
        let mut stroke = BrushStroke::new(clamp_brush(brush));
        for p in parse_points(spec).map_err(EraseError::InvalidBuffer)? {
            let p = match display {
                Some(d) => coords::to_native(p, d, native).ok_or_else(|| {
                    EraseError::InvalidBuffer(format!("cannot map {:?} from a {:?} display", p, d))
                })?,
                None => p,
            };
            stroke.points.push(p);
        }
        stroke.replay(&mut surface);
    }
    Ok(surface.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        let pts = parse_points(" 1,2   3.5,4 ").unwrap();
        assert_eq!(pts, vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]);
        assert!(parse_points("1;2").is_err());
        assert!(parse_points("a,2").is_err());
    }

    #[test]
    fn parses_display_size() {
        assert_eq!(parse_size("800x600").unwrap(), Size::new(800.0, 600.0));
        assert_eq!(parse_size("640,480").unwrap(), Size::new(640.0, 480.0));
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("800").is_err());
    }

    #[test]
    fn display_strokes_are_scaled_to_native() {
        let dims = Dims::new(200, 100);
        let mask = rasterize_strokes(
            &["50,25".to_string()],
            10.0,
            Some(Size::new(100.0, 50.0)),
            dims,
        )
        .unwrap();
        // display (50,25) at half scale lands on native (100,50)
        assert!(mask.coverage_at(100, 50) > 200);
        assert_eq!(mask.coverage_at(50, 25), 0);
    }

    #[test]
    fn args_require_a_mask_source() {
        assert!(CliArgs::try_parse_from(["retouchfe", "-i", "a.png"]).is_err());
        let ok = CliArgs::try_parse_from(["retouchfe", "-i", "a.png", "--stroke", "1,1 2,2"]).unwrap();
        assert_eq!(ok.stroke.len(), 1);
        assert!(
            CliArgs::try_parse_from(["retouchfe", "-i", "a.png", "-m", "m.png", "-s", "1,1"]).is_err()
        );
    }

    #[test]
    fn end_to_end_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        let img = image::RgbaImage::from_pixel(32, 32, image::Rgba([90, 120, 150, 255]));
        io::write_png(&input, &img).unwrap();

        let args = CliArgs::try_parse_from([
            "retouchfe",
            "-i",
            input.to_str().unwrap(),
            "--stroke",
            "10,16 22,16",
            "--brush",
            "6",
            "-o",
            output.to_str().unwrap(),
            "--timeout",
            "30",
        ])
        .unwrap();
        let written = run_one(&args, args.apply_to(EraserSettings::default())).unwrap();
        assert_eq!(written, output);
        // flat input: the filled pixels are the same colour
        assert_eq!(io::load_image(&output).unwrap(), img);
    }

    #[test]
    fn overrides_apply_to_the_given_settings() {
        let args = CliArgs::try_parse_from([
            "retouchfe", "-i", "a.png", "-s", "1,1", "--brush", "500", "--radius", "6",
            "--method", "patchmatch", "--timeout", "0",
        ])
        .unwrap();
        let base = EraserSettings {
            patch_size: 9,
            ..EraserSettings::default()
        };
        let s = args.apply_to(base);
        assert_eq!(s.brush_size, 50.0);
        assert_eq!(s.inpaint_radius, 6);
        assert_eq!(s.method, InpaintMethod::PatchMatch);
        assert_eq!(s.job_timeout(), None);
        // untouched fields come from the base, not the user's settings file
        assert_eq!(s.patch_size, 9);
    }
}
