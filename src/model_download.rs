use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const MODEL_BASE_URL: &str =
    "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models";

/// The two ONNX models behind hand detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    PalmDetector,
    HandposeEstimator,
}

impl ModelKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
            ModelKind::HandposeEstimator => "handpose_estimation_mediapipe_2023feb.onnx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandposeEstimator => "handpose",
        }
    }

    pub fn default_path(self) -> PathBuf {
        PathBuf::from("models").join(self.file_name())
    }

    fn url(self) -> String {
        format!("{MODEL_BASE_URL}/{}", self.file_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    AlreadyPresent,
    Downloaded,
}

/// Makes sure `kind` exists at `model_path`, downloading it on first use.
pub fn ensure_model_ready(kind: ModelKind, model_path: &Path) -> anyhow::Result<ModelStatus> {
    if model_path.exists() {
        log::debug!("{} model present at {}", kind.label(), model_path.display());
        return Ok(ModelStatus::AlreadyPresent);
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(kind, &kind.url(), model_path)?;
    Ok(ModelStatus::Downloaded)
}

fn download_to_path(kind: ModelKind, url: &str, dest: &Path) -> anyhow::Result<()> {
    log::info!("downloading {} model from {url} to {}", kind.label(), dest.display());

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("failed to start {} model download", kind.label()))?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    progress.finish_with_message(format!("{} model ready", kind.label()));
    log::info!("{} model saved ({downloaded} bytes)", kind.label());
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            match ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                Ok(style) => pb.set_style(style.progress_chars("=>-")),
                Err(err) => log::debug!("progress template rejected: {err}"),
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
