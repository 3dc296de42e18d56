use std::{
    io::Write,
    path::{Path, PathBuf},
};

use error_stack::{Result, ResultExt};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::LedgerError;

/// JSON documents stored under a root directory.
///
/// Writes go to a temporary file in the target directory that is then renamed
/// over the target, so readers never see a partially written document.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A store rooted at `prefix` under this store's root.
    pub fn scoped(&self, prefix: impl AsRef<Path>) -> Self {
        Self::new(self.root.join(prefix))
    }

    fn target_file(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> Result<bool, LedgerError> {
        let target_file = self.target_file(path.as_ref());
        tokio::fs::try_exists(&target_file)
            .await
            .change_context(LedgerError::Storage)
            .attach_printable_lazy(|| format!("file: {:?}", target_file))
    }

    /// Read and parse the document at `path`, `None` if it doesn't exist.
    pub async fn get_json<T>(&self, path: impl AsRef<Path>) -> Result<Option<T>, LedgerError>
    where
        T: DeserializeOwned,
    {
        let target_file = self.target_file(path.as_ref());

        let bytes = match tokio::fs::read(&target_file).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .change_context(LedgerError::Storage)
                    .attach_printable("failed to read storage file")
                    .attach_printable_lazy(|| format!("file: {:?}", target_file));
            }
        };

        let value = serde_json::from_slice(&bytes)
            .change_context(LedgerError::Storage)
            .attach_printable("failed to parse storage file")
            .attach_printable_lazy(|| format!("file: {:?}", target_file))?;

        Ok(Some(value))
    }

    /// Atomically replace the document at `path`.
    pub async fn put_json<T>(&self, path: impl AsRef<Path>, value: &T) -> Result<(), LedgerError>
    where
        T: Serialize + ?Sized,
    {
        let target_file = self.target_file(path.as_ref());
        let Some(target_dir) = target_file.parent().map(Path::to_path_buf) else {
            return Err(LedgerError::Storage)
                .attach_printable("storage file has no parent directory")
                .attach_printable_lazy(|| format!("file: {:?}", target_file));
        };

        let mut bytes = serde_json::to_vec_pretty(value)
            .change_context(LedgerError::Storage)
            .attach_printable("failed to serialize storage file")
            .attach_printable_lazy(|| format!("file: {:?}", target_file))?;
        bytes.push(b'\n');

        tokio::fs::create_dir_all(&target_dir)
            .await
            .change_context(LedgerError::Storage)
            .attach_printable("failed to create storage directory")
            .attach_printable_lazy(|| format!("dir: {:?}", target_dir))?;

        let file = target_file.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target_dir, &file, &bytes))
            .await
            .change_context(LedgerError::Storage)
            .attach_printable("storage write task failed")?
            .attach_printable_lazy(|| format!("file: {:?}", target_file))
    }

    /// Names of the entries of directory `path`, sorted. Empty if the
    /// directory doesn't exist.
    pub async fn list(&self, path: impl AsRef<Path>) -> Result<Vec<String>, LedgerError> {
        self.read_dir(path.as_ref(), false).await
    }

    /// Like [LocalStore::list], but only subdirectories.
    pub async fn list_dirs(&self, path: impl AsRef<Path>) -> Result<Vec<String>, LedgerError> {
        self.read_dir(path.as_ref(), true).await
    }

    async fn read_dir(&self, path: &Path, dirs_only: bool) -> Result<Vec<String>, LedgerError> {
        let target_dir = self.target_file(path);

        let mut entries = match tokio::fs::read_dir(&target_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .change_context(LedgerError::Storage)
                    .attach_printable("failed to list storage directory")
                    .attach_printable_lazy(|| format!("dir: {:?}", target_dir));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .change_context(LedgerError::Storage)
            .attach_printable_lazy(|| format!("dir: {:?}", target_dir))?
        {
            if dirs_only {
                let file_type = entry
                    .file_type()
                    .await
                    .change_context(LedgerError::Storage)
                    .attach_printable_lazy(|| format!("entry: {:?}", entry.path()))?;
                if !file_type.is_dir() {
                    continue;
                }
            }

            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .change_context(LedgerError::Storage)
        .attach_printable("failed to create temporary file")?;

    file.write_all(bytes)
        .change_context(LedgerError::Storage)
        .attach_printable("failed to write temporary file")?;

    file.as_file()
        .sync_all()
        .change_context(LedgerError::Storage)
        .attach_printable("failed to sync temporary file")?;

    file.persist(target)
        .map_err(|err| err.error)
        .change_context(LedgerError::Storage)
        .attach_printable("failed to move temporary file in place")?;

    Ok(())
}
