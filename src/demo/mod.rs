//! Visual demo
//!
//! Plays a frame sequence in an egui window, feeds every Nth frame to the
//! pipeline on a worker thread, and keeps a timestamped session log that is
//! written to disk when the session ends. A frame whose analysis fails is
//! treated as "no detection" and logged nowhere.

mod log;
mod source;

pub use log::SessionLog;
pub use source::FrameSource;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::DemoSettings;
use crate::vision::{PlateBox, PlateReader, PlateReading};

const REGION_COLOR: Rgb<u8> = Rgb([255, 64, 64]);
const TIME_COLUMN_WIDTH: f32 = 150.0;

/// Run the demo window until the frame sequence ends or the user closes it.
pub fn run_demo(settings: DemoSettings, reader: PlateReader) -> Result<()> {
    let source = FrameSource::from_dir(&settings.frames_dir)?;
    info!(
        "Demo: {} frames from {}",
        source.len(),
        settings.frames_dir.display()
    );

    // Playback never blocks on inference: the frame channel holds a single
    // pending frame and try_send drops frames while the worker is busy.
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<RgbImage>(1);
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<Vec<PlateReading>>();

    let worker = std::thread::spawn(move || analysis_worker(reader, frame_rx, result_tx));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 720.0]),
        ..Default::default()
    };

    let app = DemoApp::new(settings, source, frame_tx, result_rx);
    eframe::run_native(
        "plate-scout demo",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("demo window failed: {e}"))?;

    // Closing the window drops the app and its frame sender; the worker
    // sees the disconnect and exits.
    let _ = worker.join();
    Ok(())
}

/// Owns the pipeline for the whole session; one frame in, one result out.
fn analysis_worker(
    mut reader: PlateReader,
    frames: Receiver<RgbImage>,
    results: Sender<Vec<PlateReading>>,
) {
    for frame in frames.iter() {
        let image = DynamicImage::ImageRgb8(frame);
        match reader.scan(&image) {
            Ok(readings) => {
                if results.send(readings).is_err() {
                    break;
                }
            }
            Err(e) => debug!("frame analysis failed, treating as no detection: {}", e),
        }
    }
}

struct DemoApp {
    source: FrameSource,
    frame_tx: Sender<RgbImage>,
    result_rx: Receiver<Vec<PlateReading>>,

    detection_interval: u32,
    frame_delay: Duration,
    output_dir: PathBuf,

    log: SessionLog,
    log_saved: bool,
    finished: bool,

    frame_count: u32,
    last_advance: Option<Instant>,
    current_frame: Option<RgbImage>,
    latest_regions: Vec<PlateBox>,
    texture: Option<egui::TextureHandle>,
    texture_dirty: bool,
}

impl DemoApp {
    fn new(
        settings: DemoSettings,
        source: FrameSource,
        frame_tx: Sender<RgbImage>,
        result_rx: Receiver<Vec<PlateReading>>,
    ) -> Self {
        Self {
            source,
            frame_tx,
            result_rx,
            detection_interval: settings.detection_interval.max(1),
            frame_delay: Duration::from_millis(settings.frame_delay_ms),
            output_dir: settings.output_dir,
            log: SessionLog::new(),
            log_saved: false,
            finished: false,
            frame_count: 0,
            last_advance: None,
            current_frame: None,
            latest_regions: Vec::new(),
            texture: None,
            texture_dirty: false,
        }
    }

    fn drain_results(&mut self) {
        while let Ok(readings) = self.result_rx.try_recv() {
            self.latest_regions = readings.iter().map(|r| r.region).collect();
            if !readings.is_empty() {
                self.log
                    .record(readings.into_iter().map(|r| r.text).collect());
            }
            self.texture_dirty = true;
        }
    }

    fn advance_playback(&mut self) {
        if self.finished {
            return;
        }
        if let Some(last) = self.last_advance {
            if last.elapsed() < self.frame_delay {
                return;
            }
        }
        self.last_advance = Some(Instant::now());

        match self.source.next_frame() {
            Some(frame) => {
                self.frame_count += 1;
                if self.frame_count % self.detection_interval == 0 {
                    // Dropped on purpose when the worker is mid-frame
                    let _ = self.frame_tx.try_send(frame.clone());
                }
                self.current_frame = Some(frame);
                self.texture_dirty = true;
            }
            None => self.finish_session(),
        }
    }

    fn finish_session(&mut self) {
        self.finished = true;
        self.log.close();
        match self.log.save_to(&self.output_dir) {
            Ok(path) => info!("Session log saved to {}", path.display()),
            Err(e) => warn!("Failed to save session log: {}", e),
        }
        self.log_saved = true;
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let Some(frame) = &self.current_frame else {
            return;
        };

        let mut annotated = frame.clone();
        for region in &self.latest_regions {
            let rect = Rect::at(region.x_min as i32, region.y_min as i32)
                .of_size(region.width().max(1), region.height().max(1));
            draw_hollow_rect_mut(&mut annotated, rect, REGION_COLOR);
        }

        let size = [annotated.width() as usize, annotated.height() as usize];
        let color_image = egui::ColorImage::from_rgb(size, annotated.as_raw());
        self.texture = Some(ctx.load_texture("demo-frame", color_image, egui::TextureOptions::LINEAR));
        self.texture_dirty = false;
    }

    fn log_panel(&self, ui: &mut egui::Ui) {
        ui.heading("Session log");
        ui.label(format!(
            "Started {}",
            self.log.started_at().format("%Y-%m-%d %H:%M:%S")
        ));
        ui.label(format!("Total detected: {}", self.log.entries().len()));
        ui.separator();

        TableBuilder::new(ui)
            .striped(true)
            .stick_to_bottom(true)
            .column(Column::exact(TIME_COLUMN_WIDTH))
            .column(Column::remainder())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Time");
                });
                header.col(|ui| {
                    ui.strong("Plates");
                });
            })
            .body(|mut body| {
                for entry in self.log.entries() {
                    body.row(18.0, |mut row| {
                        row.col(|ui| {
                            ui.monospace(entry.timestamp.format("%H:%M:%S").to_string());
                        });
                        row.col(|ui| {
                            ui.monospace(entry.plates.join(", "));
                        });
                    });
                }
            });
    }
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_results();
        self.advance_playback();
        if self.texture_dirty {
            self.refresh_texture(ctx);
        }

        egui::SidePanel::right("session_log")
            .default_width(380.0)
            .show(ctx, |ui| self.log_panel(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.finished {
                ui.label("Playback finished - session log saved");
            }
            if let Some(texture) = &self.texture {
                ui.add(egui::Image::new(texture).shrink_to_fit());
            } else {
                ui.label("Loading frames...");
            }
        });

        ctx.request_repaint_after(Duration::from_millis(16));
    }
}

impl Drop for DemoApp {
    fn drop(&mut self) {
        // Window closed mid-playback; persist what we have
        if !self.log_saved {
            self.log.close();
            if let Err(e) = self.log.save_to(&self.output_dir) {
                warn!("Failed to save session log: {}", e);
            }
        }
    }
}
