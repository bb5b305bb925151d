//! Directory-backed namespace of key records
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{KeyError, KeyResult};
use crate::key_types::{is_key_file_name, validate_name, KeyParams, KEY_SUFFIX};
use crate::record::KeyRecord;
use crate::secret::Secret;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Key store rooted at a directory
///
/// Every `<name>.key` file under the root is one record.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    /// Open an existing store; `Ok(None)` if the root is missing or not a directory
    pub async fn open<P: AsRef<Path>>(root: P) -> KeyResult<Option<Self>> {
        let root = root.as_ref();
        match fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => Ok(Some(Self {
                root: root.to_path_buf(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a store, creating the root directory if needed
    pub async fn create_or_open<P: AsRef<Path>>(root: P) -> KeyResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!(path = %root.display(), "Opened key store");
        Ok(Self { root })
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every record under the naming convention, valid or not, sorted by name
    pub async fn all_keys(&self) -> KeyResult<Vec<KeyRecord>> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if !is_key_file_name(&file_name) || entry.file_type().await?.is_dir() {
                continue;
            }
            if file_name.to_str().is_none() {
                warn!(
                    file = %file_name.to_string_lossy(),
                    "Key file name is not valid UTF-8, its name is shown lossily"
                );
            }
            paths.push(entry.path());
        }
        paths.sort();

        debug!(count = paths.len(), path = %self.root.display(), "Listed keys");
        Ok(paths.into_iter().map(KeyRecord::new).collect())
    }

    /// Records that pass their digest check
    pub async fn valid_keys(&self) -> KeyResult<Vec<KeyRecord>> {
        let mut valid = Vec::new();
        for record in self.all_keys().await? {
            if record.is_valid().await? {
                valid.push(record);
            }
        }
        Ok(valid)
    }

    /// Look up a valid record by name
    pub async fn get_key(&self, name: &str) -> KeyResult<Option<KeyRecord>> {
        KeyRecord::open_if_valid(self.key_path(name)?).await
    }

    /// Handle for `name` whether or not it exists or is valid
    pub fn get_key_unchecked(&self, name: &str) -> KeyResult<KeyRecord> {
        Ok(KeyRecord::new(self.key_path(name)?))
    }

    /// Add a new record; `Ok(None)` if `name` is taken
    pub async fn add_key(
        &self,
        name: &str,
        secret: &Secret,
        extra_params: KeyParams,
    ) -> KeyResult<Option<KeyRecord>> {
        KeyRecord::create(self.key_path(name)?, secret, extra_params).await
    }

    /// Write a record, replacing any existing one
    pub async fn set_key(
        &self,
        name: &str,
        secret: &Secret,
        extra_params: KeyParams,
    ) -> KeyResult<KeyRecord> {
        KeyRecord::create_unchecked(self.key_path(name)?, secret, extra_params).await
    }

    /// Handle in this store for the file `record` is stored under
    ///
    /// Pairs by file name, so any record listed by another store's
    /// `all_keys` has a counterpart here even if its name is not addressable.
    pub fn counterpart(&self, record: &KeyRecord) -> KeyResult<KeyRecord> {
        let file_name = record
            .path()
            .file_name()
            .ok_or_else(|| KeyError::InvalidName(record.path().display().to_string()))?;
        Ok(KeyRecord::new(self.root.join(file_name)))
    }

    fn key_path(&self, name: &str) -> KeyResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{}{}", name, KEY_SUFFIX)))
    }
}
