// src/video_processor.rs
//
// Video driver (feature `video`). Decodes with OpenCV, runs each frame
// through the orchestrator in order with one session per file, and encodes
// the annotated frames next to the batch output.

use crate::pipeline::FrameOrchestrator;
use crate::types::BatchConfig;
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

pub struct VideoProcessor {
    output_dir: PathBuf,
    save_annotated: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VideoStats {
    pub total_frames: u64,
    pub frames_with_offset: u64,
    pub avg_fps: f64,
    pub output: Option<PathBuf>,
}

impl VideoProcessor {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            save_annotated: config.save_annotated,
        }
    }

    /// A single video file, or every video under a directory.
    pub fn find_video_files(&self, input: &Path) -> Result<Vec<PathBuf>> {
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }

        let mut videos: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        videos.sort();

        info!("Found {} video files", videos.len());
        Ok(videos)
    }

    pub fn open_video(&self, path: &Path) -> Result<VideoReader> {
        info!("Opening video: {}", path.display());

        let name = path
            .to_str()
            .with_context(|| format!("non UTF-8 path {}", path.display()))?;
        let cap = VideoCapture::from_file(name, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(VideoReader {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width,
            height,
        })
    }

    pub fn create_writer(
        &self,
        input_path: &Path,
        width: i32,
        height: i32,
        fps: f64,
    ) -> Result<Option<(VideoWriter, PathBuf)>> {
        if !self.save_annotated {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let output_path = annotated_video_path(&self.output_dir, input_path)?;
        info!("Output video: {}", output_path.display());

        let name = output_path
            .to_str()
            .with_context(|| format!("non UTF-8 path {}", output_path.display()))?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(name, fourcc, fps, core::Size::new(width, height), true)?;

        Ok(Some((writer, output_path)))
    }

    /// Track one video from its first frame to its last with a single
    /// session.
    pub fn process_video(
        &self,
        orchestrator: &mut FrameOrchestrator,
        path: &Path,
        keep_state: bool,
    ) -> Result<VideoStats> {
        let mut reader = self.open_video(path)?;
        let mut writer = self.create_writer(path, reader.width, reader.height, reader.fps)?;
        let mut state = orchestrator.new_session();
        let mut stats = VideoStats {
            output: writer.as_ref().map(|(_, p)| p.clone()),
            ..Default::default()
        };
        let started = Instant::now();

        while let Some(frame) = reader.read_frame()? {
            let out = orchestrator.process_frame(&frame, &mut state, keep_state);
            stats.total_frames += 1;
            if state.line_left.detected() && state.line_right.detected() {
                stats.frames_with_offset += 1;
            }

            if let Some((w, _)) = writer.as_mut() {
                let bgr = rgb_to_bgr_mat(&out.overlay)?;
                w.write(&bgr)?;
            }

            if reader.current_frame % 100 == 0 {
                debug!(
                    "Progress: {:.1}% ({}/{})",
                    reader.progress(),
                    reader.current_frame,
                    reader.total_frames
                );
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        stats.avg_fps = if elapsed > 0.0 {
            stats.total_frames as f64 / elapsed
        } else {
            0.0
        };
        Ok(stats)
    }
}

/// `<output_dir>/<stem>_annotated.mp4`
pub fn annotated_video_path(output_dir: &Path, input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("no usable file name in {}", input.display()))?;
    Ok(output_dir.join(format!("{}_annotated.mp4", stem)))
}

pub struct VideoReader {
    pub cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: i32,
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();
        let frame = RgbImage::from_raw(rgb_mat.cols() as u32, rgb_mat.rows() as u32, data)
            .context("decoded frame has unexpected size")?;
        Ok(Some(frame))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}

fn rgb_to_bgr_mat(frame: &RgbImage) -> Result<Mat> {
    let mat = Mat::from_slice(frame.as_raw())?;
    let mat = mat.reshape(3, frame.height() as i32)?;

    let mut bgr = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}
