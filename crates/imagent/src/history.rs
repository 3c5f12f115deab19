// History - generated images saved as PNG plus a JSON sidecar, listed by
// scanning the output directory

use crate::generation::{GenerationMode, GenerationResult};
use crate::styles::Style;
use crate::{ImageGenError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Timestamp prefix of every history filename (sorts chronologically)
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Timestamp stored in sidecars (sorts chronologically)
pub const SIDECAR_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const FILENAME_TIMESTAMP_LEN: usize = "YYYYMMDD_HHMMSS_ffffff".len();

/// Retries when a filename is already taken (each bumps the timestamp by 1µs)
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Contents of a JSON sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub styled_prompt: String,
    pub style: Style,
    pub mode: GenerationMode,
    pub steps: u32,
    pub guidance_scale: f64,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    pub timestamp: String,
    pub filename: String,
}

impl GenerationMetadata {
    fn new(result: &GenerationResult, timestamp: DateTime<Utc>, filename: String) -> Self {
        let p = &result.parameters;
        Self {
            prompt: p.prompt.clone(),
            styled_prompt: p.final_prompt.clone(),
            style: p.style,
            mode: result.mode,
            steps: p.steps,
            guidance_scale: p.guidance_scale,
            width: p.width,
            height: p.height,
            seed: p.seed,
            strength: p.strength,
            timestamp: timestamp.format(SIDECAR_TIMESTAMP_FORMAT).to_string(),
            filename,
        }
    }
}

/// One saved image and its sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    /// `None` when the sidecar is missing or unreadable
    pub metadata: Option<GenerationMetadata>,
}

impl HistoryRecord {
    pub fn filename(&self) -> String {
        self.image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Append-only store of generated images
pub trait HistoryStore: Send + Sync {
    /// Persist a result as image + sidecar
    fn save(&self, result: &GenerationResult) -> Result<HistoryRecord> {
        let png = result.image.encode_png()?;
        self.save_png(result, &png)
    }

    /// Persist a result whose image is already PNG-encoded.
    /// On failure nothing is left behind in the store.
    fn save_png(&self, result: &GenerationResult, png: &[u8]) -> Result<HistoryRecord>;

    /// Up to `limit` records, most recent first; empty when nothing is stored
    fn list_recent(&self, limit: usize) -> Vec<HistoryRecord>;

    /// Number of stored images
    fn count(&self) -> usize;

    /// Path of a stored file (image or sidecar) by bare filename
    fn resolve_file(&self, filename: &str) -> Option<PathBuf>;
}

/// `<timestamp>_<mode>_<style>_<seed>.png`
pub fn history_filename(timestamp: DateTime<Utc>, mode: GenerationMode, style: Style, seed: u64) -> String {
    format!(
        "{}_{}_{}_{}.png",
        timestamp.format(FILENAME_TIMESTAMP_FORMAT),
        mode.as_str(),
        style.slug(),
        seed
    )
}

/// Timestamp encoded at the start of a history filename, if it has one
pub fn parse_filename_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let prefix = filename.get(..FILENAME_TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(prefix, FILENAME_TIMESTAMP_FORMAT).ok()
}

/// History kept as flat files in one directory; every listing rescans it.
#[derive(Debug, Clone)]
pub struct DirectoryHistory {
    dir: PathBuf,
}

impl DirectoryHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_error(path: &Path, source: std::io::Error) -> ImageGenError {
        ImageGenError::HistoryWrite {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create the image file under a fresh name, bumping the timestamp on collision
    fn create_image_file(
        &self,
        result: &GenerationResult,
        png: &[u8],
    ) -> Result<(DateTime<Utc>, String, PathBuf)> {
        let mut timestamp = result.timestamp;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = history_filename(
                timestamp,
                result.mode,
                result.parameters.style,
                result.parameters.seed,
            );
            let path = self.dir.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(png) {
                        drop(file);
                        let _ = fs::remove_file(&path);
                        return Err(Self::write_error(&path, e));
                    }
                    return Ok((timestamp, filename, path));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    timestamp += Duration::microseconds(1);
                }
                Err(e) => return Err(Self::write_error(&path, e)),
            }
        }
        Err(Self::write_error(
            &self.dir,
            std::io::Error::new(ErrorKind::AlreadyExists, "no free history filename"),
        ))
    }

    fn load_metadata(path: &Path) -> Option<GenerationMetadata> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Could not read metadata {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&contents) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!("Could not parse metadata {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Image filenames carrying a history timestamp, newest first
    fn scan(&self) -> Vec<(NaiveDateTime, String)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut images: Vec<(NaiveDateTime, String)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".png"))
            .filter_map(|name| parse_filename_timestamp(&name).map(|ts| (ts, name)))
            .collect();

        images.sort_by(|a, b| b.cmp(a));
        images
    }
}

impl HistoryStore for DirectoryHistory {
    fn save_png(&self, result: &GenerationResult, png: &[u8]) -> Result<HistoryRecord> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::write_error(&self.dir, e))?;

        let (timestamp, filename, image_path) = self.create_image_file(result, png)?;
        tracing::info!("Image saved: {}", image_path.display());

        let metadata = GenerationMetadata::new(result, timestamp, filename);
        let metadata_path = image_path.with_extension("json");
        let written = serde_json::to_vec_pretty(&metadata)
            .map_err(ImageGenError::from)
            .and_then(|json| {
                fs::write(&metadata_path, json).map_err(|e| Self::write_error(&metadata_path, e))
            });
        if let Err(e) = written {
            // An image without its sidecar is not a history entry
            if let Err(remove) = fs::remove_file(&image_path) {
                tracing::warn!(
                    error = %remove,
                    "Could not remove orphaned image {}",
                    image_path.display()
                );
            }
            return Err(e);
        }
        tracing::debug!("Metadata saved: {}", metadata_path.display());

        Ok(HistoryRecord {
            image_path,
            metadata_path,
            metadata: Some(metadata),
        })
    }

    fn list_recent(&self, limit: usize) -> Vec<HistoryRecord> {
        self.scan()
            .into_iter()
            .take(limit)
            .map(|(_, name)| {
                let image_path = self.dir.join(&name);
                let metadata_path = image_path.with_extension("json");
                let metadata = Self::load_metadata(&metadata_path);
                HistoryRecord {
                    image_path,
                    metadata_path,
                    metadata,
                }
            })
            .collect()
    }

    fn count(&self) -> usize {
        self.scan().len()
    }

    fn resolve_file(&self, filename: &str) -> Option<PathBuf> {
        let plain = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\'])
            && (filename.ends_with(".png") || filename.ends_with(".json"));
        if !plain {
            return None;
        }
        let path = self.dir.join(filename);
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ResolvedParameters;
    use crate::GeneratedImage;
    use chrono::TimeZone;

    fn result_at(timestamp: DateTime<Utc>, seed: u64) -> GenerationResult {
        GenerationResult {
            image: GeneratedImage {
                data: vec![7; 8 * 8 * 3],
                width: 8,
                height: 8,
                prompt: "a cat".into(),
                seed,
            },
            parameters: ResolvedParameters {
                prompt: "a cat".into(),
                final_prompt: "a cat".into(),
                style: Style::OilPainting,
                steps: 30,
                guidance_scale: 7.5,
                width: 8,
                height: 8,
                seed,
                strength: None,
            },
            mode: GenerationMode::Text2Img,
            timestamp,
        }
    }

    #[test]
    fn test_filename_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + Duration::microseconds(42);
        let name = history_filename(ts, GenerationMode::Img2Img, Style::Render3d, 1234);
        assert_eq!(name, "20240309_140507_000042_img2img_3d_render_1234.png");
        assert_eq!(
            parse_filename_timestamp(&name),
            Some(ts.naive_utc())
        );
        assert_eq!(parse_filename_timestamp("holiday.png"), None);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path().join("does-not-exist"));
        assert!(history.list_recent(10).is_empty());
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_collision_bumps_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = history.save(&result_at(ts, 1)).unwrap();
        let second = history.save(&result_at(ts, 1)).unwrap();
        assert_ne!(first.image_path, second.image_path);
        assert_eq!(history.count(), 2);

        let recent = history.list_recent(5);
        assert_eq!(recent[0].image_path, second.image_path);
        assert_eq!(recent[1].image_path, first.image_path);
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.png"), b"x").unwrap();
        fs::write(dir.path().join("20240101_000000_000000_text2img_none_1.txt"), b"x").unwrap();
        let history = DirectoryHistory::new(dir.path());
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_missing_sidecar_yields_record_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = history.save(&result_at(ts, 3)).unwrap();
        fs::remove_file(&record.metadata_path).unwrap();

        let recent = history.list_recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].metadata, None);
    }

    #[test]
    fn test_resolve_file_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = history.save(&result_at(ts, 3)).unwrap();

        assert_eq!(history.resolve_file(&record.filename()), Some(record.image_path.clone()));
        assert!(history.resolve_file("../secret.png").is_none());
        assert!(history.resolve_file("missing.png").is_none());
        assert!(history.resolve_file("Cargo.toml").is_none());
    }

    #[test]
    fn test_failed_sidecar_write_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let name = history_filename(ts, GenerationMode::Text2Img, Style::OilPainting, 5);
        // A directory where the sidecar should go makes the write fail
        fs::create_dir(dir.path().join(name.replace(".png", ".json"))).unwrap();

        let err = history.save(&result_at(ts, 5)).unwrap_err();
        assert!(matches!(err, ImageGenError::HistoryWrite { .. }));
        assert!(!dir.path().join(&name).exists());
        assert_eq!(history.count(), 0);
        assert!(history.list_recent(10).is_empty());
    }

    #[test]
    fn test_save_png_stores_given_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirectoryHistory::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = result_at(ts, 9);
        let png = result.image.encode_png().unwrap();

        let record = history.save_png(&result, &png).unwrap();
        assert_eq!(fs::read(&record.image_path).unwrap(), png);
        assert!(record.metadata_path.exists());
        assert_eq!(history.count(), 1);
    }
}
