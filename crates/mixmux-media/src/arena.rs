//! Per-run scratch directory.
//!
//! A [`ScratchArena`] owns one private directory under the configured work
//! directory, named after the run ID. Every file a run creates is issued by
//! [`ScratchArena::allocate`] and recorded, so [`ScratchArena::release`] can
//! remove all of it. Release happens exactly once: an explicit `release()`
//! claims it, otherwise `Drop` does a synchronous best-effort sweep.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Longest sanitized file name stem handed out by the arena.
const MAX_NAME_LEN: usize = 64;

/// Request-scoped owner of temporary files.
#[derive(Debug)]
pub struct ScratchArena {
    run_id: String,
    dir: PathBuf,
    tracked: Mutex<Vec<PathBuf>>,
    seq: AtomicUsize,
    released: AtomicBool,
}

impl ScratchArena {
    /// Create the private directory `<base>/<run_id>`.
    ///
    /// Fails if the directory already exists: two runs never share one.
    pub async fn open(base: impl AsRef<Path>, run_id: &str) -> MediaResult<Self> {
        let base = base.as_ref();
        let dir = base.join(sanitize_name(run_id));

        tokio::fs::create_dir_all(base)
            .await
            .map_err(|source| MediaError::ArenaUnavailable {
                path: base.to_path_buf(),
                source,
            })?;

        tokio::fs::create_dir(&dir)
            .await
            .map_err(|source| MediaError::ArenaUnavailable {
                path: dir.clone(),
                source,
            })?;

        debug!(run_id, dir = %dir.display(), "Opened scratch arena");

        Ok(Self {
            run_id: run_id.to_string(),
            dir,
            tracked: Mutex::new(Vec::new()),
            seq: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Issue a unique path for `name` inside the arena and record it.
    ///
    /// The file is not created. Names are reduced to `[A-Za-z0-9._-]` and
    /// prefixed with a per-arena sequence number.
    pub fn allocate(&self, name: &str) -> MediaResult<PathBuf> {
        if self.is_released() {
            return Err(MediaError::ArenaReleased);
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("{:03}-{}", seq, sanitize_name(name)));

        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.clone());

        Ok(path)
    }

    /// Copy an existing file into a freshly allocated path, keeping its extension.
    pub async fn import_copy(&self, src: &Path, stem: &str) -> MediaResult<PathBuf> {
        if !src.exists() {
            return Err(MediaError::FileNotFound(src.to_path_buf()));
        }

        let name = match src.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.to_string(),
        };
        let dest = self.allocate(&name)?;
        tokio::fs::copy(src, &dest).await?;
        Ok(dest)
    }

    /// Paths issued so far, in allocation order.
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Delete every tracked file and the arena directory.
    ///
    /// Files that are already gone are skipped. Calling this again is a no-op.
    /// Other filesystem errors are reported after every path has been tried.
    pub async fn release(&self) -> MediaResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_error: Option<std::io::Error> = None;
        let mut removed = 0usize;

        for path in self.tracked() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(run_id = %self.run_id, path = %path.display(), error = %e, "Failed to remove scratch file");
                    first_error.get_or_insert(e);
                }
            }
        }

        // Sweeps anything an external process left next to our files
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(run_id = %self.run_id, dir = %self.dir.display(), error = %e, "Failed to remove scratch directory");
                first_error.get_or_insert(e);
            }
        }

        debug!(run_id = %self.run_id, removed, "Released scratch arena");

        match first_error {
            None => Ok(()),
            Some(source) => Err(MediaError::ArenaUnavailable {
                path: self.dir.clone(),
                source,
            }),
        }
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(run_id = %self.run_id, "Released scratch arena on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(run_id = %self.run_id, error = %e, "Failed to remove scratch directory on drop"),
        }
    }
}

fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_allocate_is_unique_and_tracked() {
        let base = TempDir::new().unwrap();
        let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();

        let a = arena.allocate("video.mp4").unwrap();
        let b = arena.allocate("video.mp4").unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with(arena.dir()));
        assert_eq!(arena.tracked(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_names_cannot_escape_the_arena() {
        let base = TempDir::new().unwrap();
        let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();

        let path = arena.allocate("../../etc/passwd").unwrap();
        assert_eq!(path.parent().unwrap(), arena.dir());

        let path = arena.allocate("my song (live).mp3").unwrap();
        assert!(path.to_string_lossy().ends_with("my_song__live_.mp3"));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_a_directory() {
        let base = TempDir::new().unwrap();
        let _first = ScratchArena::open(base.path(), "same-id").await.unwrap();
        let second = ScratchArena::open(base.path(), "same-id").await;
        assert!(matches!(second, Err(MediaError::ArenaUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_open_fails_when_base_is_a_file() {
        let base = TempDir::new().unwrap();
        let file = base.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let result = ScratchArena::open(&file, "run").await;
        assert!(matches!(result, Err(MediaError::ArenaUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let base = TempDir::new().unwrap();
        let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();

        let a = arena.allocate("a.mp4").unwrap();
        let b = arena.allocate("b.wav").unwrap();
        tokio::fs::write(&a, b"aaaa").await.unwrap();
        tokio::fs::write(&b, b"bbbb").await.unwrap();

        // One file vanishes before release
        tokio::fs::remove_file(&b).await.unwrap();

        arena.release().await.unwrap();
        assert!(!arena.dir().exists());
        assert!(!a.exists());

        arena.release().await.unwrap();
        assert!(!arena.dir().exists());
    }

    #[tokio::test]
    async fn test_allocate_after_release_fails() {
        let base = TempDir::new().unwrap();
        let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();
        arena.release().await.unwrap();
        assert!(matches!(arena.allocate("x"), Err(MediaError::ArenaReleased)));
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let base = TempDir::new().unwrap();
        let dir = {
            let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();
            let path = arena.allocate("left.mp4").unwrap();
            tokio::fs::write(&path, b"data").await.unwrap();
            arena.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_import_copy_keeps_extension() {
        let base = TempDir::new().unwrap();
        let src = base.path().join("input.m4a");
        tokio::fs::write(&src, b"audio").await.unwrap();

        let arena = ScratchArena::open(base.path(), "run-1").await.unwrap();
        let copy = arena.import_copy(&src, "mixed").await.unwrap();

        assert_eq!(copy.extension().unwrap(), "m4a");
        assert_eq!(tokio::fs::read(&copy).await.unwrap(), b"audio");
        assert!(src.exists());
    }
}
