//! Still frames and the sources that produce them.
//!
//! Capture hardware is out of scope: an external grabber (camera daemon,
//! `ffmpeg`, stream recorder) writes JPEG files and these sources pick
//! them up. A source that has nothing usable returns `None`, which the
//! sampler treats as "not ready" and skips quietly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// One encoded still frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    jpeg: Vec<u8>,
}

impl Frame {
    /// Wraps JPEG bytes, or `None` if they are empty or lack the JPEG
    /// start-of-image marker (e.g. a file caught mid-write).
    #[must_use]
    pub fn from_jpeg(jpeg: Vec<u8>) -> Option<Self> {
        jpeg.starts_with(&JPEG_SOI).then_some(Self { jpeg })
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    /// Always false; frames are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// A live video source that can hand out its current frame.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Short description for logs, e.g. the file or directory path.
    fn describe(&self) -> String;

    /// Captures the current frame, or `None` when the source is not
    /// ready.
    async fn capture(&self) -> Option<Frame>;
}

/// Re-reads one JPEG file on every capture.
///
/// Suited to a grabber that keeps overwriting `latest.jpg`.
#[derive(Debug, Clone)]
pub struct SnapshotFileSource {
    path: PathBuf,
}

impl SnapshotFileSource {
    /// Creates a source reading `path`. The file does not need to exist
    /// yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for SnapshotFileSource {
    fn describe(&self) -> String {
        format!("snapshot {}", self.path.display())
    }

    async fn capture(&self) -> Option<Frame> {
        read_frame(&self.path).await
    }
}

/// Plays back the JPEG files of a directory in file-name order, one per
/// capture.
///
/// After the last file the source reports "not ready" forever, like a
/// video that has ended, unless it was opened with `looping`.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: AtomicUsize,
    looping: bool,
}

impl DirectoryFrameSource {
    /// Lists the `.jpg`/`.jpeg` files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn open(dir: impl Into<PathBuf>, looping: bool) -> std::io::Result<Self> {
        let dir = dir.into();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_jpeg_path(path))
            .collect();
        files.sort();

        log::debug!("Found {} frame(s) in {}", files.len(), dir.display());

        Ok(Self {
            dir,
            files,
            next: AtomicUsize::new(0),
            looping,
        })
    }

    /// Number of frames in the directory.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn next_path(&self) -> Option<&Path> {
        if self.files.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        let idx = if self.looping {
            idx % self.files.len()
        } else {
            idx
        };
        self.files.get(idx).map(PathBuf::as_path)
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    fn describe(&self) -> String {
        format!("frames {}", self.dir.display())
    }

    async fn capture(&self) -> Option<Frame> {
        let path = self.next_path()?;
        read_frame(path).await
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

async fn read_frame(path: &Path) -> Option<Frame> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let frame = Frame::from_jpeg(bytes);
            if frame.is_none() {
                log::trace!("{} is not a complete JPEG yet", path.display());
            }
            frame
        }
        Err(e) => {
            log::trace!("No frame at {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(tag: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, tag, 0xFF, 0xD9]
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn frame_requires_jpeg_marker() {
        assert!(Frame::from_jpeg(Vec::new()).is_none());
        assert!(Frame::from_jpeg(b"GIF89a".to_vec()).is_none());
        let frame = Frame::from_jpeg(jpeg(1)).unwrap();
        assert_eq!(frame.len(), 7);
        assert!(!frame.is_empty());
    }

    #[tokio::test]
    async fn snapshot_source_is_not_ready_until_file_exists() {
        let dir = temp_dir("fightwatch_snapshot_source");
        let path = dir.join("latest.jpg");
        let source = SnapshotFileSource::new(&path);

        assert!(source.capture().await.is_none());

        std::fs::write(&path, b"").unwrap();
        assert!(source.capture().await.is_none());

        std::fs::write(&path, jpeg(7)).unwrap();
        let frame = source.capture().await.unwrap();
        assert_eq!(frame.as_bytes(), jpeg(7).as_slice());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn directory_source_plays_in_name_order_then_ends() {
        let dir = temp_dir("fightwatch_directory_source");
        std::fs::write(dir.join("frame_002.jpg"), jpeg(2)).unwrap();
        std::fs::write(dir.join("frame_001.JPEG"), jpeg(1)).unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignore me").unwrap();

        let source = DirectoryFrameSource::open(&dir, false).unwrap();
        assert_eq!(source.frame_count(), 2);

        assert_eq!(source.capture().await.unwrap().as_bytes(), jpeg(1).as_slice());
        assert_eq!(source.capture().await.unwrap().as_bytes(), jpeg(2).as_slice());
        assert!(source.capture().await.is_none());
        assert!(source.capture().await.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn looping_directory_source_wraps_around() {
        let dir = temp_dir("fightwatch_directory_source_loop");
        std::fs::write(dir.join("a.jpg"), jpeg(1)).unwrap();
        std::fs::write(dir.join("b.jpg"), jpeg(2)).unwrap();

        let source = DirectoryFrameSource::open(&dir, true).unwrap();
        let tags: Vec<u8> = [
            source.capture().await,
            source.capture().await,
            source.capture().await,
        ]
        .into_iter()
        .map(|f| f.unwrap().as_bytes()[4])
        .collect();
        assert_eq!(tags, vec![1, 2, 1]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_directory_is_never_ready() {
        let dir = temp_dir("fightwatch_directory_source_empty");
        let source = DirectoryFrameSource::open(&dir, true).unwrap();
        assert!(source.capture().await.is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
