//! Part-file lifecycle: creation, retry truncation, and atomic publication.
//!
//! In-progress transfers write to `<cache>/<name>.part`; the part file is
//! renamed onto its destination only after the transfer fully succeeds, so a
//! crash or failure never clobbers a published artifact. Payloads without a
//! usable filename write to an exclusive `alpmtmp.XXXXXX` temp instead,
//! which is always discarded on failure (such transfers cannot resume).
//!
//! Files are created with mode `0666 & !umask`, matching what the user's
//! shell would produce.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncSeekExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::payload::OpenMode;

/// Mode for files this crate creates: `0666 & !umask`.
#[cfg(unix)]
pub(crate) fn download_mode() -> u32 {
    0o666 & !cached_umask()
}

/// The process umask, read once and cached.
///
/// Reading the umask requires a set-then-restore pair, which is not
/// reentrant; the first call must not race another thread changing the
/// umask. Every later call is a plain load.
#[cfg(unix)]
fn cached_umask() -> u32 {
    use std::sync::OnceLock;

    use nix::sys::stat::{umask, Mode};

    static UMASK: OnceLock<u32> = OnceLock::new();
    *UMASK.get_or_init(|| {
        let prior = umask(Mode::empty());
        umask(prior);
        prior.bits() as u32
    })
}

#[cfg(unix)]
async fn apply_download_mode(path: &Path) -> std::io::Result<()> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, Permissions::from_mode(download_mode())).await
}

#[cfg(not(unix))]
async fn apply_download_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Opens (or creates) a named part file in the requested mode.
pub(crate) async fn open_part(path: &Path, mode: OpenMode) -> Result<File> {
    let existed = path.exists();
    let file = match mode {
        OpenMode::Truncate => {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .await?
        }
        OpenMode::Append => {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?
        }
    };
    if !existed {
        apply_download_mode(path).await?;
    }
    Ok(file)
}

/// Creates an exclusive, randomly-named temp file in `dir`.
///
/// Used when the URL yields no usable filename; the file persists on disk
/// (it is the published artifact for tempfile-only transfers) and the
/// caller is responsible for unlinking it on failure.
pub(crate) async fn create_anonymous(dir: &Path) -> Result<(File, PathBuf)> {
    let dir = dir.to_path_buf();
    let named = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix("alpmtmp.")
            .rand_bytes(6)
            .tempfile_in(dir)
    })
    .await
    .map_err(|e| Error::System {
        source: std::io::Error::other(e),
    })??;

    let (file, path) = named.keep().map_err(|e| Error::System { source: e.error })?;
    apply_download_mode(&path).await?;
    Ok((File::from_std(file), path))
}

/// Drops any bytes a failed mirror left behind and rewinds for the retry.
pub(crate) async fn truncate_for_retry(file: &mut File) -> std::io::Result<()> {
    file.set_len(0).await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(())
}

/// Applies the server-reported modification time to the local file.
#[cfg(unix)]
pub(crate) fn apply_remote_mtime(path: &Path, mtime: chrono::DateTime<chrono::FixedOffset>) {
    use nix::sys::stat::utimes;
    use nix::sys::time::TimeVal;

    let tv = TimeVal::new(mtime.timestamp() as _, 0);
    if let Err(err) = utimes(path, &tv, &tv) {
        debug!("could not set file times on {}: {err}", path.display());
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_remote_mtime(path: &Path, _mtime: chrono::DateTime<chrono::FixedOffset>) {
    let _ = path;
}

/// Atomically publishes the finished part file onto its destination.
pub(crate) async fn publish(temp: &Path, dest: &Path) -> Result<()> {
    tokio::fs::rename(temp, dest).await?;
    Ok(())
}

/// Removes a temp file, ignoring races with concurrent cleanup.
pub(crate) async fn unlink(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!("could not remove {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_part_truncate_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.pkg.part");
        std::fs::write(&path, b"stale").unwrap();

        let file = open_part(&path, OpenMode::Truncate).await.unwrap();
        drop(file);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn open_part_append_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.pkg.part");
        std::fs::write(&path, b"1234").unwrap();

        let file = open_part(&path, OpenMode::Append).await.unwrap();
        drop(file);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn anonymous_temp_is_created_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (file, path) = create_anonymous(dir.path()).await.unwrap();
        drop(file);

        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("alpmtmp."));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn truncate_for_retry_zeroes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.part");
        std::fs::write(&path, b"half a mirror's worth").unwrap();

        let mut file = OpenOptions::new().write(true).open(&path).await.unwrap();
        truncate_for_retry(&mut file).await.unwrap();
        drop(file);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn publish_renames_over_destination() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("foo.pkg.part");
        let dest = dir.path().join("foo.pkg");
        std::fs::write(&temp, b"payload").unwrap();

        publish(&temp, &dest).await.unwrap();
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[cfg(unix)]
    #[test]
    fn download_mode_respects_umask() {
        let mode = download_mode();
        assert_eq!(mode & !0o666, 0);
    }
}
