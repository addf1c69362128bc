//! Filesystem credential store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{is_valid_session_name, CredentialStore, Credentials};
use crate::error::{Result, SessionError};

/// Credential file name inside each session directory.
pub const CREDS_FILE: &str = "creds.json";

/// One directory per session under a root, each holding `creds.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `root`. Nothing is touched on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one session's credentials.
    pub fn session_dir(&self, session: &str) -> Result<PathBuf> {
        validate_session_name(session)?;
        Ok(self.root.join(session))
    }

    fn creds_path(&self, session: &str) -> Result<PathBuf> {
        Ok(self.session_dir(session)?.join(CREDS_FILE))
    }
}

fn validate_session_name(session: &str) -> Result<()> {
    if !is_valid_session_name(session) {
        return Err(SessionError::Credentials(format!(
            "Session name {session:?} is not a valid directory name"
        )));
    }
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn prepare(&self, session: &str) -> Result<()> {
        let dir = self.session_dir(session)?;
        fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Credentials(format!("Failed to create {}: {e}", dir.display()))
        })
    }

    fn load(&self, session: &str) -> Result<Option<Credentials>> {
        let path = self.creds_path(session)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Credentials(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            },
        };
        let creds = serde_json::from_str(&content).map_err(|e| {
            SessionError::Credentials(format!("Failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(creds))
    }

    fn save(&self, session: &str, credentials: &Credentials) -> Result<()> {
        let dir = self.session_dir(session)?;
        fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Credentials(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let data = serde_json::to_vec_pretty(credentials)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
            SessionError::Credentials(format!(
                "Failed to create temp file in {}: {e}",
                dir.display()
            ))
        })?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(dir.join(CREDS_FILE))?;

        tracing::debug!(session, "credentials persisted");
        Ok(())
    }

    fn clear(&self, session: &str) -> Result<()> {
        let path = self.creds_path(session)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Credentials(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(store.load("work").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        let creds = Credentials::registered("bot@s.net", b"state".to_vec());
        store.save("work", &creds).unwrap();

        assert!(dir.path().join("work").join(CREDS_FILE).exists());
        assert_eq!(store.load("work").unwrap(), Some(creds));
    }

    #[test]
    fn test_save_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save("work", &Credentials::default()).unwrap();
        store
            .save("work", &Credentials::registered("bot@s.net", vec![9]))
            .unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("work"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(CREDS_FILE)]);
        assert!(store.load("work").unwrap().unwrap().registered);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store
            .save("work", &Credentials::registered("a@s.net", vec![1]))
            .unwrap();
        assert!(store.load("home").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save("work", &Credentials::default()).unwrap();
        store.clear("work").unwrap();
        assert!(store.load("work").unwrap().is_none());
        // Clearing twice is fine
        store.clear("work").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.prepare("work").unwrap();
        fs::write(dir.path().join("work").join(CREDS_FILE), "{ not json").unwrap();

        assert!(matches!(
            store.load("work"),
            Err(SessionError::Credentials(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        for name in ["", "..", "a/b", "a\\b"] {
            assert!(store.prepare(name).is_err(), "{name:?} should be rejected");
        }
    }
}
