// ============================================================================
// Interactive front-end (feature "gui") — paint a mask, process, export
// ============================================================================
//
// The UI thread never blocks: the session is polled once per frame and a
// repaint is scheduled while a load or a job is outstanding.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use egui::{
    Color32, ColorImage, CursorIcon, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions,
};
use image::RgbaImage;
use tracing::{info, warn};

use crate::backend::{BackendState, BuiltinLoader};
use crate::buffer::{Dims, ImageBuffer, MaskBuffer};
use crate::capture::{BRUSH_MAX, BRUSH_MIN, CaptureSurface, clamp_brush};
use crate::coordinator::JobHandle;
use crate::coords::{self, Point, Size};
use crate::io;
use crate::render::ResultImage;
use crate::session::{EraserSession, SessionConfig, SessionEvent};
use crate::settings::EraserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(30);
const MASK_TINT: [u8; 3] = [255, 48, 48];

/// Opens the window and runs until it is closed.
pub fn run() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 780.0])
            .with_min_inner_size([480.0, 360.0])
            .with_title("RetouchFE"),
        ..Default::default()
    };
    eframe::run_native(
        "RetouchFE",
        options,
        Box::new(|_cc| Box::new(EraserApp::new(EraserSettings::load()))),
    )
}

/// Loaded picture plus everything painted on it.
struct Document {
    source: RgbaImage,
    source_tex: TextureHandle,
    surface: CaptureSurface,
    mask_tex: TextureHandle,
    mask_revision: u64,
    result: Option<(ResultImage, TextureHandle)>,
    show_result: bool,
}

impl Document {
    fn dims(&self) -> Dims {
        self.surface.dims()
    }
}

pub struct EraserApp {
    settings: EraserSettings,
    session: EraserSession,
    doc: Option<Document>,
    pending: Option<JobHandle>,
    status: String,
}

impl EraserApp {
    pub fn new(settings: EraserSettings) -> Self {
        let session = EraserSession::new(Arc::new(BuiltinLoader), SessionConfig::from(&settings));
        Self {
            settings,
            session,
            doc: None,
            pending: None,
            status: "Drop an image onto the window to begin.".to_string(),
        }
    }

    fn open(&mut self, ctx: &egui::Context, path: &Path) {
        match io::load_image(path) {
            Ok(img) => {
                let dims = Dims::new(img.width(), img.height());
                let source_tex = ctx.load_texture("source", to_color_image(&img), TextureOptions::LINEAR);
                let surface = CaptureSurface::new(dims);
                let mask_tex = ctx.load_texture(
                    "mask",
                    mask_overlay(surface.mask()),
                    TextureOptions::LINEAR,
                );
                self.doc = Some(Document {
                    mask_revision: surface.revision(),
                    source: img,
                    source_tex,
                    surface,
                    mask_tex,
                    result: None,
                    show_result: false,
                });
                info!(path = %path.display(), %dims, "image opened");
                self.status = format!("{} ({})", path.display(), dims);
                if self.ensure_backend() {
                    self.status.push_str(", loading backend…");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not open image");
                self.status = format!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    /// Starts a load unless one is running or already succeeded.
    fn ensure_backend(&mut self) -> bool {
        if !wants_load(self.session.backend_state()) {
            return false;
        }
        self.session.request_load();
        true
    }

    fn process(&mut self) {
        let Some(doc) = self.doc.as_mut() else { return };
        let image = match ImageBuffer::snapshot_of(&doc.source) {
            Ok(image) => image,
            Err(e) => {
                self.status = e.to_string();
                return;
            }
        };
        let mask = doc.surface.snapshot();
        match self.session.submit(image, mask, self.settings.inpaint_params()) {
            Ok(handle) => {
                self.pending = Some(handle);
                self.status = "Processing…".to_string();
            }
            Err(rejected) => {
                doc.surface.restore(rejected.mask);
                self.status = rejected.error.to_string();
            }
        }
    }

    fn handle_events(&mut self, ctx: &egui::Context, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::BackendLoaded(Ok(())) => self.status = "Backend ready.".to_string(),
                SessionEvent::BackendLoaded(Err(e)) => self.status = e.to_string(),
                SessionEvent::JobFinished { handle, .. } => {
                    if self.pending != Some(handle) {
                        continue;
                    }
                    self.pending = None;
                    match self.session.take_result(handle) {
                        Some(Ok(buffer)) => self.show_result(ctx, buffer),
                        Some(Err(e)) => self.status = e.to_string(),
                        None => {}
                    }
                }
            }
        }
    }

    fn show_result(&mut self, ctx: &egui::Context, buffer: crate::buffer::ResultBuffer) {
        let Some(doc) = self.doc.as_mut() else { return };
        match ResultImage::from_buffer(buffer) {
            Ok(result) => {
                let tex = ctx.load_texture("result", to_color_image(result.as_rgba()), TextureOptions::LINEAR);
                doc.result = Some((result, tex));
                doc.show_result = true;
                self.status = "Done.".to_string();
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn export(&mut self) {
        let Some((result, _)) = self.doc.as_ref().and_then(|d| d.result.as_ref()) else {
            return;
        };
        self.status = match result.export_to(&self.settings.output_dir()) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => format!("Export failed: {}", e),
        };
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let state = self.session.backend_state().clone();
            if ui.add_enabled(wants_load(&state), egui::Button::new("Load backend")).clicked()
                && self.ensure_backend()
            {
                self.status = "Loading backend…".to_string();
            }
            ui.label(format!("Backend: {}", state.label()));
            ui.separator();

            let mut brush = self.settings.brush_size;
            let slider = ui.add(egui::Slider::new(&mut brush, BRUSH_MIN..=BRUSH_MAX).text("Brush"));
            if slider.changed() {
                self.settings.brush_size = clamp_brush(brush);
                if let Err(e) = self.settings.save() {
                    warn!(error = %e, "settings not saved");
                }
            }

            let has_doc = self.doc.is_some();
            if ui.add_enabled(has_doc, egui::Button::new("Clear mask")).clicked() {
                if let Some(doc) = self.doc.as_mut() {
                    doc.surface.clear();
                    doc.show_result = false;
                }
            }

            let can_process = has_doc && state == BackendState::Ready && !self.session.is_busy();
            if ui.add_enabled(can_process, egui::Button::new("Remove")).clicked() {
                self.process();
            }
            if self.session.is_busy() {
                ui.spinner();
                if ui.button("Cancel").clicked() {
                    self.session.cancel();
                    self.pending = None;
                    self.status = "Cancelled.".to_string();
                }
            }

            let has_result = self.doc.as_ref().is_some_and(|d| d.result.is_some());
            if let Some(doc) = self.doc.as_mut() {
                ui.add_enabled(has_result, egui::Checkbox::new(&mut doc.show_result, "Show result"));
            }
            if ui.add_enabled(has_result, egui::Button::new("Download PNG")).clicked() {
                self.export();
            }
        });
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let brush = self.settings.brush_size;
        let Some(doc) = self.doc.as_mut() else {
            ui.centered_and_justified(|ui| ui.label("Drop an image here"));
            return;
        };

        let avail = ui.available_rect_before_wrap();
        let native = Size::from(doc.dims());
        let scale = (avail.width() / native.width).min(avail.height() / native.height);
        let rect = Rect::from_min_size(avail.min, egui::vec2(native.width * scale, native.height * scale));
        let display = Size::new(rect.width(), rect.height());
        let origin = Point::new(rect.min.x, rect.min.y);
        let response = ui.allocate_rect(rect, Sense::drag());

        let to_native = |pos: Pos2| {
            coords::pointer_to_native(Point::new(pos.x, pos.y), origin, display, native)
        };

        if !doc.show_result {
            if response.drag_started() {
                if let Some(p) = response.interact_pointer_pos().and_then(to_native) {
                    doc.surface.begin_stroke(p, brush);
                }
            } else if response.dragged() {
                if let Some(p) = response.interact_pointer_pos().and_then(to_native) {
                    doc.surface.extend_stroke(p);
                }
            }
            if response.drag_released() {
                doc.surface.end_stroke();
            }
        }

        if doc.surface.revision() != doc.mask_revision {
            doc.mask_tex.set(mask_overlay(doc.surface.mask()), TextureOptions::LINEAR);
            doc.mask_revision = doc.surface.revision();
        }

        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        let painter = ui.painter_at(rect);
        match (&doc.result, doc.show_result) {
            (Some((_, tex)), true) => {
                painter.image(tex.id(), rect, uv, Color32::WHITE);
            }
            _ => {
                painter.image(doc.source_tex.id(), rect, uv, Color32::WHITE);
                painter.image(doc.mask_tex.id(), rect, uv, Color32::WHITE);
            }
        }

        if !doc.show_result {
            if let Some(pos) = response.hover_pos() {
                if let Some(d) = coords::cursor_diameter(brush, display, native) {
                    ui.ctx().set_cursor_icon(CursorIcon::None);
                    painter.circle_stroke(pos, d * 0.5, Stroke::new(1.5, Color32::WHITE));
                    painter.circle_stroke(pos, d * 0.5 + 1.0, Stroke::new(1.0, Color32::BLACK));
                }
            }
        }
    }
}

impl eframe::App for EraserApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(path) = dropped.into_iter().find_map(|f| f.path) {
            if io::is_supported(&path) {
                self.open(ctx, &path);
            } else {
                self.status = format!("Unsupported file: {}", path.display());
            }
        }

        let events = self.session.poll();
        self.handle_events(ctx, events);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| ui.label(&self.status));
        egui::CentralPanel::default().show(ctx, |ui| self.canvas(ui));

        if self.session.is_busy() || self.session.backend_state() == &BackendState::Loading {
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }
}

fn wants_load(state: &BackendState) -> bool {
    matches!(state, BackendState::Unloaded | BackendState::Failed(_))
}

fn to_color_image(img: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied([img.width() as usize, img.height() as usize], img.as_raw())
}

/// Painted coverage as a translucent red overlay.
fn mask_overlay(mask: &MaskBuffer) -> ColorImage {
    let Dims { width, height } = mask.dims();
    let pixels = mask
        .as_bytes()
        .chunks_exact(4)
        .map(|px| {
            let [r, g, b] = MASK_TINT;
            Color32::from_rgba_unmultiplied(r, g, b, px[3] / 2)
        })
        .collect();
    ColorImage {
        size: [width as usize, height as usize],
        pixels,
    }
}
