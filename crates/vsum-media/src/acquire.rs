//! Media acquisition: reference → local, decodable media handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};
use vsum_models::VideoReference;

use crate::download::{MediaFetcher, YtDlpFetcher};
use crate::error::{MediaError, MediaResult};
use crate::stream::{FfprobeInspector, StreamInfo, StreamInspector};

/// A local, seekable media file plus its true duration.
///
/// When the media was downloaded, the handle owns the temporary workspace it
/// lives in; the workspace is deleted when the handle is dropped or released.
#[derive(Debug)]
pub struct MediaHandle {
    path: PathBuf,
    info: StreamInfo,
    workspace: Option<TempDir>,
}

impl MediaHandle {
    /// Wrap an already-inspected file that the pipeline does not own.
    pub fn borrowed(path: impl Into<PathBuf>, info: StreamInfo) -> Self {
        Self {
            path: path.into(),
            info,
            workspace: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duration in seconds, as read from the decoded container.
    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// True when the handle deletes its backing file on release.
    pub fn is_owned(&self) -> bool {
        self.workspace.is_some()
    }

    /// Free the backing resource now, reporting cleanup failures.
    pub fn release(self) -> MediaResult<()> {
        if let Some(workspace) = self.workspace {
            let dir = workspace.path().to_path_buf();
            workspace.close()?;
            debug!(workspace = %dir.display(), "Released media workspace");
        }
        Ok(())
    }
}

/// Resolves references to [`MediaHandle`]s.
pub struct MediaAcquirer {
    fetcher: Arc<dyn MediaFetcher>,
    inspector: Arc<dyn StreamInspector>,
    work_dir: PathBuf,
}

impl MediaAcquirer {
    /// Create an acquirer that downloads with yt-dlp into `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(work_dir, Arc::new(YtDlpFetcher::new()))
    }

    /// Create an acquirer with a custom fetcher.
    pub fn with_fetcher(work_dir: impl Into<PathBuf>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            fetcher,
            inspector: Arc::new(FfprobeInspector),
            work_dir: work_dir.into(),
        }
    }

    /// Read stream information through `inspector` instead of ffprobe.
    pub fn with_inspector(mut self, inspector: Arc<dyn StreamInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Resolve `reference` to a decodable local media handle.
    pub async fn acquire(&self, reference: &VideoReference) -> MediaResult<MediaHandle> {
        if let Some(path) = reference.local_path() {
            info!(path = %path.display(), "Using local media file");
            let info = self.open_stream(reference, &path).await?;
            return Ok(MediaHandle::borrowed(path, info));
        }

        let url = reference
            .download_url()
            .ok_or_else(|| MediaError::acquisition(reference.as_str(), "reference cannot be resolved"))?;

        tokio::fs::create_dir_all(&self.work_dir).await.map_err(|e| {
            MediaError::acquisition(
                reference.as_str(),
                format!("cannot create work dir {}: {}", self.work_dir.display(), e),
            )
        })?;

        let workspace = tempfile::Builder::new()
            .prefix("vsum-")
            .tempdir_in(&self.work_dir)
            .map_err(|e| {
                MediaError::acquisition(reference.as_str(), format!("cannot create workspace: {}", e))
            })?;

        // From here on every early return drops `workspace`, removing it.
        let path = self
            .fetcher
            .fetch(&url, workspace.path())
            .await
            .map_err(|e| MediaError::acquisition(reference.as_str(), e.to_string()))?;

        let info = self.open_stream(reference, &path).await?;

        info!(
            path = %path.display(),
            duration = info.duration,
            width = info.width,
            height = info.height,
            "Media acquired"
        );

        Ok(MediaHandle {
            path,
            info,
            workspace: Some(workspace),
        })
    }
}

impl MediaAcquirer {
    /// Inspect the file and read its true duration from the stream.
    async fn open_stream(&self, reference: &VideoReference, path: &Path) -> MediaResult<StreamInfo> {
        self.inspector.inspect(path).await.map_err(|e| {
            warn!(path = %path.display(), "Media is not a decodable stream: {}", e);
            MediaError::acquisition(reference.as_str(), format!("cannot open stream: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fetcher that writes a junk file and remembers where it put it.
    struct JunkFetcher {
        seen_dir: Mutex<Option<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl MediaFetcher for JunkFetcher {
        async fn fetch(&self, _url: &str, dest_dir: &Path) -> MediaResult<PathBuf> {
            *self.seen_dir.lock().unwrap() = Some(dest_dir.to_path_buf());
            if self.fail {
                return Err(MediaError::download_failed("Video unavailable"));
            }
            let path = dest_dir.join("source.mp4");
            std::fs::write(&path, b"definitely not a video").unwrap();
            Ok(path)
        }
    }

    fn acquirer(fail: bool, work_dir: &Path) -> (MediaAcquirer, Arc<JunkFetcher>) {
        let fetcher = Arc::new(JunkFetcher {
            seen_dir: Mutex::new(None),
            fail,
        });
        (
            MediaAcquirer::with_fetcher(work_dir, fetcher.clone()),
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_download_failure_is_acquisition_error_and_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let (acquirer, fetcher) = acquirer(true, work.path());
        let reference = VideoReference::parse("https://example.com/v.mp4").unwrap();

        let err = acquirer.acquire(&reference).await.unwrap_err();
        assert!(matches!(err, MediaError::Acquisition { .. }));
        assert!(err.to_string().contains("Video unavailable"));

        let dir = fetcher.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "workspace must be removed on failure");
    }

    #[tokio::test]
    async fn test_undecodable_download_is_acquisition_error_and_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let (acquirer, fetcher) = acquirer(false, work.path());
        let reference = VideoReference::parse("https://example.com/v.mp4").unwrap();

        let err = acquirer.acquire(&reference).await.unwrap_err();
        assert!(matches!(err, MediaError::Acquisition { .. }));

        let dir = fetcher.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "workspace must be removed on failure");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_acquisition_error() {
        let work = tempfile::tempdir().unwrap();
        let (acquirer, _) = acquirer(false, work.path());
        let reference = VideoReference::parse("/nonexistent/dir/clip.mp4").unwrap();

        let err = acquirer.acquire(&reference).await.unwrap_err();
        assert!(matches!(err, MediaError::Acquisition { .. }));
    }

    struct FixedStream(f64);

    #[async_trait]
    impl StreamInspector for FixedStream {
        async fn inspect(&self, _path: &Path) -> MediaResult<StreamInfo> {
            Ok(StreamInfo {
                duration: self.0,
                width: 640,
                height: 360,
                fps: 25.0,
                codec: "h264".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_downloaded_handle_owns_workspace_until_release() {
        let work = tempfile::tempdir().unwrap();
        let (acquirer, fetcher) = acquirer(false, work.path());
        let acquirer = acquirer.with_inspector(Arc::new(FixedStream(42.5)));
        let reference = VideoReference::parse("https://example.com/v.mp4").unwrap();

        let handle = acquirer.acquire(&reference).await.unwrap();
        assert!(handle.is_owned());
        assert_eq!(handle.duration(), 42.5);
        assert!(handle.path().exists());

        let dir = fetcher.seen_dir.lock().unwrap().clone().unwrap();
        handle.release().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_borrowed_handle_release_keeps_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let info = StreamInfo {
            duration: 1.0,
            width: 2,
            height: 2,
            fps: 30.0,
            codec: "h264".to_string(),
        };
        let handle = MediaHandle::borrowed(file.path(), info);
        assert!(!handle.is_owned());
        handle.release().unwrap();
        assert!(file.path().exists());
    }
}
