//! Per-job working directories.

use std::io;
use std::path::{Path, PathBuf};

use beatreel_models::JobId;

const FRAMES_DIR: &str = "frames";
const OUTPUT_FILE: &str = "output.mp4";

/// Filesystem scope owned by exactly one job: `<root>/<job_id>/` holding
/// `frames/`, `audio.<ext>` and `output.mp4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn for_job(base: &Path, job_id: &JobId) -> Self {
        Self {
            root: base.join(job_id.as_str()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn audio_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("audio.{}", extension))
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(OUTPUT_FILE)
    }

    /// Create an empty directory tree, discarding anything left behind.
    pub async fn prepare(&self) -> io::Result<()> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        tokio::fs::create_dir_all(self.frames_dir()).await
    }

    pub async fn remove(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Frame file names in ascending order.
    pub async fn frame_files(&self) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.frames_dir()).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Replace this directory's path in `message` so job errors do not leak
    /// host paths.
    pub fn redact(&self, message: &str) -> String {
        message.replace(self.root.to_string_lossy().as_ref(), "<workdir>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_layout_and_prepare() {
        let base = tempfile::tempdir().unwrap();
        let id = JobId::from_string("job-1");
        let dir = WorkDir::for_job(base.path(), &id);

        assert_eq!(dir.root(), base.path().join("job-1"));
        assert_eq!(dir.audio_path("wav"), base.path().join("job-1/audio.wav"));
        assert_eq!(dir.output_path(), base.path().join("job-1/output.mp4"));

        dir.prepare().await.unwrap();
        tokio::fs::write(dir.frames_dir().join("frame_000001.png"), b"b").await.unwrap();
        tokio::fs::write(dir.frames_dir().join("frame_000000.png"), b"a").await.unwrap();
        assert_eq!(
            dir.frame_files().await.unwrap(),
            vec!["frame_000000.png", "frame_000001.png"]
        );

        // prepare() starts from scratch
        dir.prepare().await.unwrap();
        assert!(dir.frame_files().await.unwrap().is_empty());

        dir.remove().await.unwrap();
        assert!(!dir.root().exists());
        dir.remove().await.unwrap();
    }

    #[test]
    fn test_redact() {
        let dir = WorkDir::for_job(Path::new("/var/beatreel"), &JobId::from_string("abc"));
        assert_eq!(
            dir.redact("FFmpeg failed: /var/beatreel/abc/frames/frame_%06d.png: No such file"),
            "FFmpeg failed: <workdir>/frames/frame_%06d.png: No such file"
        );
    }
}
