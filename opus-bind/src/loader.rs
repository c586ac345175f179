//! Extraction and one-time loading of the native library.
//!
//! The library is loaded at most once per process. The first call to
//! [`load_from`] decides the outcome for the rest of the process: after a
//! successful load further calls are no-ops, after a failed load every call
//! reports the same [`Error::LinkFailure`].

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::native::NativeLibrary;
use crate::platform::resolve_library_name;
use crate::resources::native_binary;

/// Environment variable naming a persistent install directory.
pub const NATIVE_DIR_ENV: &str = "OPUS_JNI_NATIVE_DIR";

/// A value initialised at most once, remembering a failed initialisation.
pub struct LoadLatch<T> {
    cell: OnceCell<std::result::Result<T, String>>,
}

impl<T> LoadLatch<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the value if initialisation has run and succeeded.
    pub fn get(&self) -> Option<&T> {
        self.cell.get().and_then(|r| r.as_ref().ok())
    }

    /// Returns the stored error if initialisation has run and failed.
    pub fn failure(&self) -> Option<Error> {
        self.cell
            .get()
            .and_then(|r| r.as_ref().err())
            .map(|msg| Error::LinkFailure(msg.clone()))
    }

    /// Runs `load` if no initialisation has happened yet.
    ///
    /// Concurrent callers block until the first one finishes; `load` runs
    /// exactly once across all of them.
    pub fn get_or_load<F>(&self, load: F) -> Result<&T>
    where
        F: FnOnce() -> std::result::Result<T, String>,
    {
        self.cell
            .get_or_init(load)
            .as_ref()
            .map_err(|msg| Error::LinkFailure(msg.clone()))
    }
}

impl<T> Default for LoadLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

static NATIVE: LoadLatch<Arc<NativeLibrary>> = LoadLatch::new();

// Serializes ephemeral setup so concurrent first users extract only once.
static SETUP: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Returns true if the native library has been loaded in this process.
pub fn is_loaded() -> bool {
    NATIVE.get().is_some()
}

/// Copies the platform's native binary into `directory`.
///
/// Fails if the binary is not bundled or registered, or if the target file
/// already exists or cannot be written. Returns the path of the new file.
/// The file only appears under its final name once fully written.
pub fn extract_to(directory: &Path) -> Result<PathBuf> {
    let name = resolve_library_name()?;
    let data = native_binary(name).ok_or_else(|| Error::MissingResource(name.to_string()))?;
    let path = directory.join(name);

    write_new(directory, &path, &mut &data[..]).map_err(|source| Error::Extraction {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), bytes = data.len(), "extracted native library");
    Ok(path)
}

// Writes into a temporary file next to `path` and moves it into place without
// replacing an existing file. Nothing is left behind on failure.
fn write_new(directory: &Path, path: &Path, source: &mut dyn Read) -> io::Result<()> {
    let mut file = NamedTempFile::new_in(directory)?;
    io::copy(source, &mut file)?;
    file.as_file().sync_all()?;
    file.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

/// Loads the native binary previously extracted into `directory`.
///
/// Only the first call in a process performs a load. A missing,
/// incompatible or incomplete binary is a fatal [`Error::LinkFailure`].
pub fn load_from(directory: &Path) -> Result<()> {
    load_native(directory).map(|_| ())
}

/// Extracts into a fresh temporary directory and loads from there.
///
/// The directory is removed once the library is loaded where the OS allows
/// deleting a mapped library; on Windows it is left behind.
pub fn setup_ephemeral() -> Result<()> {
    setup_ephemeral_native().map(|_| ())
}

/// Returns the loaded library, setting it up on first use.
///
/// Loads from [`NATIVE_DIR_ENV`] when set, otherwise from an ephemeral
/// extraction.
pub(crate) fn ensure_loaded() -> Result<Arc<NativeLibrary>> {
    if let Some(lib) = loaded()? {
        return Ok(lib);
    }
    match std::env::var_os(NATIVE_DIR_ENV) {
        Some(dir) => load_native(Path::new(&dir)),
        None => setup_ephemeral_native(),
    }
}

// The outcome of an earlier load, if any. A failed load is returned as the
// same `LinkFailure` so that no later setup step can mask it.
fn loaded() -> Result<Option<Arc<NativeLibrary>>> {
    if let Some(err) = NATIVE.failure() {
        return Err(err);
    }
    Ok(NATIVE.get().cloned())
}

fn load_native(directory: &Path) -> Result<Arc<NativeLibrary>> {
    let name = resolve_library_name()?;
    let path = directory.join(name);

    let lib = NATIVE.get_or_load(|| {
        let lib = NativeLibrary::open(&path)?;
        debug!(path = %path.display(), "loaded native library");
        Ok(Arc::new(lib))
    })?;

    if lib.path() != path.as_path() {
        warn!(
            requested = %path.display(),
            loaded = %lib.path().display(),
            "native library already loaded, ignoring load request"
        );
    }
    Ok(lib.clone())
}

fn setup_ephemeral_native() -> Result<Arc<NativeLibrary>> {
    let _guard = SETUP.lock();
    if let Some(lib) = loaded()? {
        return Ok(lib);
    }

    let dir = tempfile::Builder::new()
        .prefix("opus-jni")
        .tempdir()
        .map_err(|source| Error::Extraction {
            path: std::env::temp_dir(),
            source,
        })?;
    extract_to(dir.path())?;
    let lib = load_native(dir.path())?;

    release_ephemeral_dir(dir, cfg!(windows));
    Ok(lib)
}

// Removes the ephemeral directory, or keeps it when the OS cannot delete a
// loaded library. Returns the kept path.
fn release_ephemeral_dir(dir: TempDir, keep: bool) -> Option<PathBuf> {
    if keep {
        let kept = dir.keep();
        debug!(path = %kept.display(), "keeping temporary native library directory");
        return Some(kept);
    }
    if let Err(e) = dir.close() {
        warn!(error = %e, "failed to remove temporary native library directory");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_latch_runs_once_under_contention() {
        const THREADS: usize = 16;

        let latch = &LoadLatch::<usize>::new();
        let loads = &AtomicUsize::new(0);
        let barrier = &Barrier::new(THREADS);

        thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        *latch
                            .get_or_load(|| {
                                thread::sleep(Duration::from_millis(20));
                                Ok(loads.fetch_add(1, Ordering::SeqCst) + 100)
                            })
                            .unwrap()
                    })
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), 100);
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(latch.get(), Some(&100));
    }

    #[test]
    fn test_latch_failure_is_sticky() {
        let latch: LoadLatch<u32> = LoadLatch::new();

        let err = latch.get_or_load(|| Err("no such file".into())).unwrap_err();
        assert!(matches!(&err, Error::LinkFailure(msg) if msg == "no such file"));
        assert!(latch.get().is_none());

        let err = latch.get_or_load(|| Ok(7)).unwrap_err();
        assert!(matches!(err, Error::LinkFailure(_)));
    }

    #[test]
    fn test_latch_failure_is_visible_before_loading() {
        let latch: LoadLatch<u32> = LoadLatch::new();
        assert!(latch.failure().is_none());

        let _ = latch.get_or_load(|| Err("bad elf header".into()));
        let err = latch.failure().unwrap();
        assert!(matches!(&err, Error::LinkFailure(msg) if msg == "bad elf header"));

        let ok: LoadLatch<u32> = LoadLatch::new();
        ok.get_or_load(|| Ok(3)).unwrap();
        assert!(ok.failure().is_none());
    }

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("No space left on device"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0x7F);
            self.remaining -= n;
            Ok(n)
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn test_interrupted_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libnative.so");

        let mut source = FailingReader { remaining: 64 * 1024 };
        let err = write_new(dir.path(), &path, &mut source).unwrap_err();
        assert_eq!(err.to_string(), "No space left on device");
        assert!(entries(dir.path()).is_empty());

        // A retry into the same directory is not blocked by the failed attempt.
        write_new(dir.path(), &path, &mut &b"complete"[..]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"complete");
    }

    #[test]
    fn test_write_new_does_not_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libnative.so");
        write_new(dir.path(), &path, &mut &b"first"[..]).unwrap();

        let err = write_new(dir.path(), &path, &mut &b"second"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
        assert_eq!(entries(dir.path()), vec![path]);
    }

    #[test]
    fn test_release_ephemeral_dir() {
        let dir = tempfile::Builder::new().prefix("opus-jni").tempdir().unwrap();
        let path = dir.path().to_path_buf();
        assert_eq!(release_ephemeral_dir(dir, false), None);
        assert!(!path.exists());

        let dir = tempfile::Builder::new().prefix("opus-jni").tempdir().unwrap();
        let kept = release_ephemeral_dir(dir, true).unwrap();
        assert!(kept.is_dir());
        std::fs::remove_dir(&kept).unwrap();
    }

    #[test]
    fn test_latch_second_load_is_noop() {
        let latch: LoadLatch<u32> = LoadLatch::new();
        assert_eq!(*latch.get_or_load(|| Ok(1)).unwrap(), 1);
        assert_eq!(*latch.get_or_load(|| Ok(2)).unwrap(), 1);
    }
}
