//! Hands a recording's audio file to the OS default handler.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::db::models::RecordingDetail;
use crate::db::{Database, StorageError};

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Recording {0} not found")]
    RecordingNotFound(i64),
    #[error("No file path specified for recording {0}")]
    NoFilePath(i64),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to launch player: {0}")]
    Launch(#[source] io::Error),
    #[error("Database error: {0}")]
    Storage(#[from] StorageError),
}

/// Opens a file with whatever the platform considers its default handler.
pub trait Launcher {
    fn launch(&self, path: &Path) -> io::Result<()>;
}

/// `open`-crate launcher: `xdg-open`, `open` or `start` depending on the OS.
/// Returns as soon as the handler is spawned.
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, path: &Path) -> io::Result<()> {
        open::that_detached(path)
    }
}

/// Resolve a stored file path. Relative paths are taken against `media_root`
/// when one is configured. Returns `None` when the file does not exist.
pub fn resolve_file(file_path: &str, media_root: Option<&Path>) -> Option<PathBuf> {
    let raw = Path::new(file_path);
    let path = match media_root {
        Some(root) if raw.is_relative() => root.join(raw),
        _ => raw.to_path_buf(),
    };
    path.is_file().then_some(path)
}

/// Whether a stored file path can be handed to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Playable(PathBuf),
    /// No path stored, or only whitespace.
    NoFile,
    /// A path is stored but nothing exists there. Holds the path that was tried.
    Missing(PathBuf),
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Playable(_) => "ok",
            Self::NoFile => "no file",
            Self::Missing(_) => "missing",
        }
    }
}

pub fn file_status(file_path: Option<&str>, media_root: Option<&Path>) -> FileStatus {
    let stored = match file_path {
        Some(p) if !p.trim().is_empty() => p,
        _ => return FileStatus::NoFile,
    };
    match resolve_file(stored, media_root) {
        Some(path) => FileStatus::Playable(path),
        None => {
            let tried = match media_root {
                Some(root) if Path::new(stored).is_relative() => root.join(stored),
                _ => PathBuf::from(stored),
            };
            FileStatus::Missing(tried)
        }
    }
}

/// Look up a recording and launch its file. On success returns the recording
/// that was started and the resolved path.
pub fn play(
    db: &Database,
    recording_id: i64,
    media_root: Option<&Path>,
    launcher: &dyn Launcher,
) -> Result<(RecordingDetail, PathBuf), PlaybackError> {
    let detail = db
        .get_recording(recording_id)?
        .ok_or(PlaybackError::RecordingNotFound(recording_id))?;

    let path = match file_status(detail.recording.file_path.as_deref(), media_root) {
        FileStatus::Playable(path) => path,
        FileStatus::NoFile => return Err(PlaybackError::NoFilePath(recording_id)),
        FileStatus::Missing(tried) => return Err(PlaybackError::FileNotFound(tried)),
    };

    launcher.launch(&path).map_err(PlaybackError::Launch)?;
    log::info!("Playing: {} ({})", detail.label(), path.display());
    Ok((detail, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewRecording;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: RefCell<Vec<PathBuf>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, path: &Path) -> io::Result<()> {
            self.launched.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    struct FailingLauncher;

    impl Launcher for FailingLauncher {
        fn launch(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no handler"))
        }
    }

    fn db_with_recording(file_path: Option<&str>) -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let book = db.find_or_create_book("Book").unwrap();
        let essay = db.find_or_create_essay(book, "Essay", "1").unwrap();
        let id = db
            .add_recording(
                essay,
                &NewRecording {
                    reciter: Some("Jane Doe".into()),
                    file_path: file_path.map(String::from),
                    ..Default::default()
                },
            )
            .unwrap();
        (db, id)
    }

    #[test]
    fn test_unknown_recording() {
        let (db, id) = db_with_recording(None);
        let err = play(&db, id + 100, None, &RecordingLauncher::default()).unwrap_err();
        assert!(matches!(err, PlaybackError::RecordingNotFound(n) if n == id + 100));
    }

    #[test]
    fn test_no_file_path() {
        let launcher = RecordingLauncher::default();
        let (db, id) = db_with_recording(None);
        let err = play(&db, id, None, &launcher).unwrap_err();
        assert!(matches!(err, PlaybackError::NoFilePath(_)));

        let (db, id) = db_with_recording(Some("  "));
        let err = play(&db, id, None, &launcher).unwrap_err();
        assert!(matches!(err, PlaybackError::NoFilePath(_)));
        assert!(launcher.launched.borrow().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.mp3");
        let (db, id) = db_with_recording(Some(missing.to_str().unwrap()));
        let err = play(&db, id, None, &RecordingLauncher::default()).unwrap_err();
        assert!(matches!(err, PlaybackError::FileNotFound(p) if p == missing));
    }

    #[test]
    fn test_plays_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("essay.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let launcher = RecordingLauncher::default();
        let (db, id) = db_with_recording(Some(file.to_str().unwrap()));
        let (detail, path) = play(&db, id, None, &launcher).unwrap();
        assert_eq!(path, file);
        assert_eq!(detail.recording.id, id);
        assert_eq!(*launcher.launched.borrow(), vec![file]);
    }

    #[test]
    fn test_relative_path_uses_media_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample.mp3"), b"ID3").unwrap();

        let launcher = RecordingLauncher::default();
        let (db, id) = db_with_recording(Some("sample.mp3"));
        let (_, path) = play(&db, id, Some(dir.path()), &launcher).unwrap();
        assert_eq!(path, dir.path().join("sample.mp3"));

        let other = tempfile::tempdir().unwrap();
        let err = play(&db, id, Some(other.path()), &launcher).unwrap_err();
        assert!(matches!(err, PlaybackError::FileNotFound(p) if p == other.path().join("sample.mp3")));
    }

    #[test]
    fn test_launcher_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("essay.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let (db, id) = db_with_recording(Some(file.to_str().unwrap()));
        let err = play(&db, id, None, &FailingLauncher).unwrap_err();
        assert!(matches!(err, PlaybackError::Launch(_)));
    }

    #[test]
    fn test_file_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample.mp3"), b"ID3").unwrap();
        let root = Some(dir.path());

        assert_eq!(file_status(None, root), FileStatus::NoFile);
        assert_eq!(file_status(Some(""), root), FileStatus::NoFile);
        assert_eq!(file_status(Some(" \t"), root), FileStatus::NoFile);
        assert_eq!(
            file_status(Some("sample.mp3"), root),
            FileStatus::Playable(dir.path().join("sample.mp3"))
        );
        assert_eq!(
            file_status(Some("gone.mp3"), root),
            FileStatus::Missing(dir.path().join("gone.mp3"))
        );
        assert_eq!(file_status(Some("gone.mp3"), root).label(), "missing");
        assert_eq!(file_status(None, None).label(), "no file");
    }

    #[test]
    fn test_resolve_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_file(dir.path().to_str().unwrap(), None), None);
    }
}
