use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use super::{ObjectStore, RemoteObject, RemoteRoot};
use crate::error::SyncError;

/// Directory-backed store; every regular file below the root is an object.
pub struct LocalStore {
    root: RemoteRoot,
    path: PathBuf,
}

impl LocalStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            root: RemoteRoot::Local(path.clone()),
            path,
        }
    }
}

impl ObjectStore for LocalStore {
    fn root(&self) -> &RemoteRoot {
        &self.root
    }

    fn list(&self) -> Result<Vec<RemoteObject>, SyncError> {
        if !self.path.is_dir() {
            return Err(SyncError::RootNotFound {
                root: self.root.to_string(),
            });
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.path).sort_by_file_name() {
            let entry = entry.map_err(|err| SyncError::unreachable(&self.root, err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let metadata = entry
                .metadata()
                .map_err(|err| SyncError::unreachable(&self.root, err.to_string()))?;
            objects.push(RemoteObject {
                key,
                size: metadata.len(),
                last_modified: metadata.modified().ok(),
            });
        }
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read + Send>> {
        let path = key
            .split('/')
            .fold(self.path.clone(), |path, segment| path.join(segment));
        let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }
}
