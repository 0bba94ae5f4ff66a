//! Video thumbnails as derived assets.
//!
//! Every video owns at most one thumbnail, a jpeg sidecar living next to the
//! video and keyed by the video path. All sidecar naming goes through this
//! module so the rest of the crate never string-matches filenames itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

pub const SIDECAR_SUFFIX: &str = "_thumb.jpg";

/// Served when frame extraction fails; thumbnail trouble is never an error.
pub const PLACEHOLDER_URL: &str = "/files/default_video_thumb.png";

/// True for generated sidecar files, which must never surface as content.
pub fn is_sidecar(filename: &str) -> bool {
    filename.ends_with(SIDECAR_SUFFIX)
}

/// The sidecar path for a video: same directory, stem + `_thumb.jpg`.
pub fn sidecar_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    video.with_file_name(format!("{stem}{SIDECAR_SUFFIX}"))
}

#[derive(Clone)]
pub struct Thumbnailer {
    data_dir: PathBuf,
    timeout: Duration,
}

impl Thumbnailer {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            timeout: Duration::from_secs(20),
        }
    }

    /// Resolves the thumbnail URL for a video at `video_rel` (relative to the
    /// data root), extracting a frame on demand if no sidecar exists yet.
    /// Falls back to [`PLACEHOLDER_URL`] when extraction fails or times out.
    pub async fn thumbnail_url(&self, video_rel: &str) -> String {
        let video = self.data_dir.join(video_rel);
        let sidecar = sidecar_path(&video);

        if !tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
            if let Err(err) = self.extract_frame(&video, &sidecar).await {
                tracing::warn!(video = video_rel, error = %err, "thumbnail generation failed");
                return PLACEHOLDER_URL.to_owned();
            }
        }

        let sidecar_rel = sidecar_path(Path::new(video_rel));
        format!("/files/{}", sidecar_rel.to_string_lossy().replace('\\', "/"))
    }

    async fn extract_frame(&self, video: &Path, sidecar: &Path) -> anyhow::Result<()> {
        let run = Command::new("ffmpeg")
            .arg("-i")
            .arg(video)
            .args(["-ss", "00:00:01.000", "-vframes", "1"])
            .arg(sidecar)
            .output();

        let output = tokio::time::timeout(self.timeout, run).await??;
        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_naming() {
        assert_eq!(
            sidecar_path(Path::new("users/alice/trip/clip.mp4")),
            Path::new("users/alice/trip/clip_thumb.jpg")
        );
        assert!(is_sidecar("clip_thumb.jpg"));
        assert!(!is_sidecar("clip.mp4"));
    }

    #[tokio::test]
    async fn existing_sidecar_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("clip.mp4"), b"not a real video").unwrap();
        std::fs::write(tmp.path().join("clip_thumb.jpg"), b"jpeg").unwrap();

        let thumbs = Thumbnailer::new(tmp.path().to_path_buf());
        let url = thumbs.thumbnail_url("clip.mp4").await;
        assert_eq!(url, "/files/clip_thumb.jpg");
    }

    #[tokio::test]
    async fn failed_extraction_degrades_to_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.mp4"), b"garbage").unwrap();

        let thumbs = Thumbnailer::new(tmp.path().to_path_buf());
        let url = thumbs.thumbnail_url("broken.mp4").await;
        // ffmpeg is either absent or rejects the garbage input.
        assert_eq!(url, PLACEHOLDER_URL);
    }
}
