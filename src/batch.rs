// src/batch.rs
//
// Still-image driver. Every image is an independent session: a fresh state
// and keep_state = false, so no history leaks between unrelated pictures.

use crate::pipeline::FrameOrchestrator;
use crate::types::BatchConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub with_offset: usize,
    pub written: Vec<PathBuf>,
}

/// Image files under `dir`, sorted so runs are reproducible.
pub fn find_image_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        anyhow::bail!("input directory {} does not exist", dir.display());
    }

    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_image_extension(p))
        .collect();
    images.sort();

    info!("Found {} image files in {}", images.len(), dir.display());
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `<output_dir>/<stem>_annotated.png`
pub fn annotated_path(output_dir: impl AsRef<Path>, input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("no usable file name in {}", input.display()))?;
    Ok(output_dir.as_ref().join(format!("{}_annotated.png", stem)))
}

/// Annotate every image in `config.input_dir`. A file that cannot be read
/// or written is logged and counted, not fatal.
pub fn process_directory(
    orchestrator: &mut FrameOrchestrator,
    config: &BatchConfig,
) -> Result<BatchReport> {
    let images = find_image_files(&config.input_dir)?;
    if config.save_annotated {
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("creating {}", config.output_dir))?;
    }

    let mut report = BatchReport::default();
    for (idx, path) in images.iter().enumerate() {
        info!("[{}/{}] {}", idx + 1, images.len(), path.display());
        match process_image(orchestrator, config, path) {
            Ok((written, has_offset)) => {
                report.processed += 1;
                if has_offset {
                    report.with_offset += 1;
                } else {
                    warn!("No lane offset for {}", path.display());
                }
                report.written.extend(written);
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Batch done: {} processed, {} failed, {} with offset",
        report.processed, report.failed, report.with_offset
    );
    Ok(report)
}

fn process_image(
    orchestrator: &mut FrameOrchestrator,
    config: &BatchConfig,
    path: &Path,
) -> Result<(Option<PathBuf>, bool)> {
    let frame = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();

    let mut state = orchestrator.new_session();
    let out = orchestrator.process_frame(&frame, &mut state, false);
    let has_offset = state.line_left.detected() && state.line_right.detected();

    if !config.save_annotated {
        return Ok((None, has_offset));
    }
    let target = annotated_path(&config.output_dir, path)?;
    out.overlay
        .save(&target)
        .with_context(|| format!("writing {}", target.display()))?;
    Ok((Some(target), has_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;
    use image::{Rgb, RgbImage};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lane_tracker_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_annotated_path_uses_stem() {
        let p = annotated_path("out", Path::new("imgs/test1.jpg")).unwrap();
        assert_eq!(p, Path::new("out").join("test1_annotated.png"));
    }

    #[test]
    fn test_find_image_files_filters_and_sorts() {
        let dir = scratch_dir("find");
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let names: Vec<String> = find_image_files(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        assert!(find_image_files("/definitely/not/here").is_err());
    }

    #[test]
    fn test_process_directory_writes_and_counts() {
        let input = scratch_dir("batch_in");
        let output = input.join("out");
        RgbImage::from_pixel(320, 180, Rgb([40, 40, 40]))
            .save(input.join("road.png"))
            .unwrap();
        std::fs::write(input.join("broken.jpg"), b"not an image").unwrap();

        let config = BatchConfig {
            input_dir: input.to_string_lossy().into_owned(),
            output_dir: output.to_string_lossy().into_owned(),
            save_annotated: true,
        };
        let mut orch = FrameOrchestrator::from_config(&Config::default()).unwrap();
        let report = process_directory(&mut orch, &config).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.written, vec![output.join("road_annotated.png")]);
        let written = image::open(&report.written[0]).unwrap();
        assert_eq!((written.width(), written.height()), (320, 180));
        std::fs::remove_dir_all(&input).unwrap();
    }
}
