//! A single key persisted on the local filesystem
//!
//! Each record is two files: the raw secret bytes (no framing) at
//! `<root>/<name>.key` and a sidecar at `<root>/<name>.key.params` holding the
//! SHA-256 digest, creation date and caller params. A record is valid only when
//! both exist and the digest of the secret matches the sidecar.
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
use crate::key_types::{
    creation_date_of, digest_of, KeyName, KeyParams, Sidecar, SidecarFormat, KEY_SUFFIX,
    PARAMS_SUFFIX, PARAM_CREATION_DATE, PARAM_SHA256_HEX, PRIVATE_FILE_MODE,
};
use crate::secret::Secret;
use serde_json::Value;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Handle to a key stored at a filesystem location
///
/// The files are the source of truth. A handle only caches the params mapping.
#[derive(Debug)]
pub struct KeyRecord {
    path: PathBuf,
    params_cache: RwLock<Option<KeyParams>>,
}

impl KeyRecord {
    /// Handle for `path`, whether or not anything is stored there
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            params_cache: RwLock::new(None),
        }
    }

    /// Open the record at `path` only if it exists and passes its digest check
    pub async fn open_if_valid<P: Into<PathBuf>>(path: P) -> KeyResult<Option<Self>> {
        let record = Self::new(path);
        if record.is_valid().await? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Create a record, refusing to touch an occupied location
    ///
    /// Returns `Ok(None)` when a secret already exists at `path`.
    pub async fn create<P: Into<PathBuf>>(
        path: P,
        secret: &Secret,
        extra_params: KeyParams,
    ) -> KeyResult<Option<Self>> {
        let record = Self::new(path);

        let mut file = match private_file_options().open(&record.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %record.path.display(), "Key location already occupied");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(secret.raw()).await?;
        file.sync_all().await?;
        drop(file);

        record.write_initial_params(secret, extra_params).await?;
        info!(name = %record.name(), "Created key");
        Ok(Some(record))
    }

    /// Create a record, overwriting whatever is stored at `path`
    pub async fn create_unchecked<P: Into<PathBuf>>(
        path: P,
        secret: &Secret,
        extra_params: KeyParams,
    ) -> KeyResult<Self> {
        let record = Self::new(path);
        write_replacing(&record.path, secret.raw()).await?;
        record.write_initial_params(secret, extra_params).await?;
        info!(name = %record.name(), "Wrote key (overwrite allowed)");
        Ok(record)
    }

    async fn write_initial_params(&self, secret: &Secret, extra_params: KeyParams) -> KeyResult<()> {
        let mut params = extra_params;
        params.insert(
            PARAM_SHA256_HEX.to_string(),
            Value::String(secret.sha256_hex()),
        );
        params.insert(
            PARAM_CREATION_DATE.to_string(),
            Value::from(chrono::Utc::now().timestamp()),
        );

        let mut cache = self.params_cache.write().await;
        self.write_sidecar(&params).await?;
        *cache = Some(params);
        Ok(())
    }

    /// Logical name: the file name without the key suffix
    pub fn name(&self) -> KeyName {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file_name.strip_suffix(KEY_SUFFIX) {
            Some(stem) => stem.to_string(),
            None => file_name,
        }
    }

    /// Location of the secret artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the sidecar artifact
    pub fn params_path(&self) -> PathBuf {
        let mut os: OsString = self.path.clone().into_os_string();
        os.push(PARAMS_SUFFIX);
        PathBuf::from(os)
    }

    /// Canonical location of the secret, for collaborators that reference keys by path
    pub async fn absolute_path(&self) -> KeyResult<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| KeyError::InvalidName(self.path.display().to_string()))?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let dir = fs::canonicalize(parent).await?;
        Ok(dir.join(file_name))
    }

    /// Read the stored secret; `Ok(None)` if nothing is stored
    pub async fn secret(&self) -> KeyResult<Option<Secret>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(Secret::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persisted digest, read from disk on every call
    pub async fn sha256_hex(&self) -> KeyResult<Option<String>> {
        Ok(self
            .load_sidecar()
            .await?
            .and_then(|sidecar| digest_of(&sidecar.params).map(str::to_string)))
    }

    /// Creation time in epoch seconds, absent for legacy or damaged sidecars
    pub async fn creation_date(&self) -> KeyResult<Option<i64>> {
        Ok(creation_date_of(&self.params().await?))
    }

    /// Format of the sidecar on disk, `None` when missing or unreadable
    pub async fn sidecar_format(&self) -> KeyResult<Option<SidecarFormat>> {
        Ok(self.load_sidecar().await?.map(|sidecar| sidecar.format))
    }

    /// True iff a secret is stored and its digest matches the sidecar
    pub async fn is_valid(&self) -> KeyResult<bool> {
        let Some(secret) = self.secret().await? else {
            return Ok(false);
        };
        let Some(stored) = self.sha256_hex().await? else {
            return Ok(false);
        };
        Ok(secret.sha256_hex() == stored.to_ascii_lowercase())
    }

    /// Params mapping, loaded once per handle
    ///
    /// A missing or corrupt sidecar reads as an empty mapping.
    pub async fn params(&self) -> KeyResult<KeyParams> {
        if let Some(params) = self.params_cache.read().await.as_ref() {
            return Ok(params.clone());
        }

        let mut cache = self.params_cache.write().await;
        if let Some(params) = cache.as_ref() {
            return Ok(params.clone());
        }
        match self.load_sidecar().await? {
            Some(sidecar) => {
                *cache = Some(sidecar.params.clone());
                Ok(sidecar.params)
            }
            None => Ok(KeyParams::new()),
        }
    }

    /// Merge `delta` into the stored params and persist the result
    ///
    /// Load, merge and persist run under the cache write lock; the cache is
    /// only replaced once the new sidecar is on disk. Values in `delta` win.
    /// Legacy sidecars are rewritten in the structured format.
    pub async fn set_params(&self, delta: KeyParams) -> KeyResult<KeyParams> {
        let mut cache = self.params_cache.write().await;

        let mut merged = self
            .load_sidecar()
            .await?
            .map(|sidecar| sidecar.params)
            .unwrap_or_default();
        merged.extend(delta);

        self.write_sidecar(&merged).await?;
        *cache = Some(merged.clone());
        debug!(name = %self.name(), "Updated key params");
        Ok(merged)
    }

    /// Copy the secret and sidecar verbatim to `dest`
    ///
    /// Does not check that this record is valid first.
    pub async fn copy_to(&self, dest: &KeyRecord) -> KeyResult<()> {
        if same_file(&self.path, &dest.path).await {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("cannot copy {} onto itself", self.path.display()),
            )
            .into());
        }

        let mut dest_cache = dest.params_cache.write().await;
        fs::copy(&self.path, &dest.path).await?;
        match fs::copy(self.params_path(), dest.params_path()).await {
            Ok(_) => {}
            // No sidecar at the source: the copy must not keep a stale one
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match fs::remove_file(dest.params_path()).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
        *dest_cache = None;
        debug!(
            name = %self.name(),
            dest = %dest.path.display(),
            "Copied key"
        );
        Ok(())
    }

    async fn load_sidecar(&self) -> KeyResult<Option<Sidecar>> {
        let params_path = self.params_path();
        let contents = match fs::read_to_string(&params_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(name = %self.name(), "Key params are not valid UTF-8, ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match Sidecar::parse(&contents) {
            Ok(sidecar) => Ok(Some(sidecar)),
            Err(e) => {
                warn!(name = %self.name(), error = %e, "Failed to parse key params, ignoring");
                Ok(None)
            }
        }
    }

    async fn write_sidecar(&self, params: &KeyParams) -> KeyResult<()> {
        let json = serde_json::to_string_pretty(params)?;
        write_replacing(&self.params_path(), json.as_bytes()).await?;
        Ok(())
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Exclusive create, readable by the owner only on Unix
fn private_file_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(PRIVATE_FILE_MODE);
    options
}

/// Write `contents` to a sibling temp file, then rename it over `path`
async fn write_replacing(path: &Path, contents: &[u8]) -> KeyResult<()> {
    let mut tmp_os: OsString = path.as_os_str().to_owned();
    tmp_os.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp_path = PathBuf::from(tmp_os);

    let result = async {
        let mut file = private_file_options().open(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_types::PARAM_VOLUME;
    use tempfile::TempDir;

    fn key_path(dir: &TempDir, name: &str) -> PathBuf {
        dir.path().join(format!("{}{}", name, KEY_SUFFIX))
    }

    fn volume_param(volume: &str) -> KeyParams {
        let mut params = KeyParams::new();
        params.insert(PARAM_VOLUME.to_string(), Value::from(volume));
        params
    }

    #[tokio::test]
    async fn test_create_writes_secret_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let secret = Secret::generate(32).unwrap();

        let record = KeyRecord::create(key_path(&dir, "alpha"), &secret, volume_param("tank/a"))
            .await
            .unwrap()
            .expect("location was free");

        assert_eq!(std::fs::read(record.path()).unwrap(), secret.raw());
        assert_eq!(record.name(), "alpha");
        assert!(record.is_valid().await.unwrap());
        assert_eq!(
            record.sha256_hex().await.unwrap().as_deref(),
            Some(secret.sha256_hex().as_str())
        );
        assert!(record.creation_date().await.unwrap().is_some());
        assert_eq!(
            record.sidecar_format().await.unwrap(),
            Some(SidecarFormat::Structured)
        );

        let params = record.params().await.unwrap();
        assert_eq!(params.get(PARAM_VOLUME), Some(&Value::from("tank/a")));
    }

    #[tokio::test]
    async fn test_create_refuses_occupied_location() {
        let dir = TempDir::new().unwrap();
        let first = Secret::generate(32).unwrap();
        let second = Secret::generate(32).unwrap();
        let path = key_path(&dir, "alpha");

        KeyRecord::create(&path, &first, KeyParams::new()).await.unwrap().unwrap();
        let again = KeyRecord::create(&path, &second, KeyParams::new()).await.unwrap();
        assert!(again.is_none());

        let record = KeyRecord::new(&path);
        assert_eq!(record.secret().await.unwrap(), Some(first.clone()));
        assert_eq!(record.sha256_hex().await.unwrap(), Some(first.sha256_hex()));
    }

    #[tokio::test]
    async fn test_create_unchecked_overwrites_invalid_record() {
        let dir = TempDir::new().unwrap();
        let path = key_path(&dir, "alpha");
        std::fs::write(&path, b"junk").unwrap();
        std::fs::write(KeyRecord::new(&path).params_path(), b"{ broken").unwrap();

        let secret = Secret::generate(32).unwrap();
        let record = KeyRecord::create_unchecked(&path, &secret, KeyParams::new())
            .await
            .unwrap();
        assert!(record.is_valid().await.unwrap());
        assert_eq!(record.secret().await.unwrap(), Some(secret));
    }

    #[tokio::test]
    async fn test_missing_record_is_absent_not_error() {
        let dir = TempDir::new().unwrap();
        let record = KeyRecord::new(key_path(&dir, "ghost"));

        assert_eq!(record.secret().await.unwrap(), None);
        assert!(!record.is_valid().await.unwrap());
        assert!(record.params().await.unwrap().is_empty());
        assert!(KeyRecord::open_if_valid(key_path(&dir, "ghost"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_invalidates_intact_secret() {
        let dir = TempDir::new().unwrap();
        let path = key_path(&dir, "alpha");
        let secret = Secret::generate(32).unwrap();
        let record = KeyRecord::create(&path, &secret, KeyParams::new())
            .await
            .unwrap()
            .unwrap();

        std::fs::write(record.params_path(), b"{ not json").unwrap();

        let fresh = KeyRecord::new(&path);
        assert!(fresh.params().await.unwrap().is_empty());
        assert!(!fresh.is_valid().await.unwrap());
        assert_eq!(fresh.secret().await.unwrap(), Some(secret));
    }

    #[tokio::test]
    async fn test_legacy_digest_sidecar_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = key_path(&dir, "legacy");
        let secret = Secret::generate(32).unwrap();
        std::fs::write(&path, secret.raw()).unwrap();
        let record = KeyRecord::new(&path);
        std::fs::write(record.params_path(), secret.sha256_hex()).unwrap();

        assert_eq!(
            record.sidecar_format().await.unwrap(),
            Some(SidecarFormat::LegacyDigest)
        );
        assert!(record.is_valid().await.unwrap());
        assert_eq!(record.creation_date().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_params_merges_and_upgrades_legacy() {
        let dir = TempDir::new().unwrap();
        let path = key_path(&dir, "legacy");
        let secret = Secret::generate(32).unwrap();
        std::fs::write(&path, secret.raw()).unwrap();
        let record = KeyRecord::new(&path);
        std::fs::write(record.params_path(), secret.sha256_hex()).unwrap();

        let merged = record.set_params(volume_param("tank/b")).await.unwrap();
        assert_eq!(merged.get(PARAM_VOLUME), Some(&Value::from("tank/b")));
        assert_eq!(
            record.sidecar_format().await.unwrap(),
            Some(SidecarFormat::Structured)
        );
        assert!(record.is_valid().await.unwrap());

        // Later values win on conflicts
        let merged = record.set_params(volume_param("tank/c")).await.unwrap();
        assert_eq!(merged.get(PARAM_VOLUME), Some(&Value::from("tank/c")));
        let reread = KeyRecord::new(&path).params().await.unwrap();
        assert_eq!(reread, merged);
    }

    #[tokio::test]
    async fn test_copy_to_duplicates_both_artifacts() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let secret = Secret::generate(32).unwrap();
        let src = KeyRecord::create(key_path(&src_dir, "alpha"), &secret, volume_param("tank/a"))
            .await
            .unwrap()
            .unwrap();

        let dst = KeyRecord::new(key_path(&dst_dir, "alpha"));
        src.copy_to(&dst).await.unwrap();

        assert!(dst.is_valid().await.unwrap());
        assert_eq!(dst.secret().await.unwrap(), Some(secret));
        assert_eq!(
            std::fs::read(src.params_path()).unwrap(),
            std::fs::read(dst.params_path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_onto_itself_is_refused() {
        let dir = TempDir::new().unwrap();
        let secret = Secret::generate(32).unwrap();
        let src = KeyRecord::create(key_path(&dir, "alpha"), &secret, KeyParams::new())
            .await
            .unwrap()
            .unwrap();

        let same = KeyRecord::new(key_path(&dir, "alpha"));
        assert!(matches!(src.copy_to(&same).await, Err(KeyError::Io(_))));
        assert_eq!(src.secret().await.unwrap(), Some(secret));
    }

    #[tokio::test]
    async fn test_absolute_path_is_canonical() {
        let dir = TempDir::new().unwrap();
        let record = KeyRecord::new(key_path(&dir, "alpha"));
        let abs = record.absolute_path().await.unwrap();

        assert!(abs.is_absolute());
        assert_eq!(abs.file_name().unwrap(), "alpha.key");
        assert_eq!(
            abs.parent().unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_without_sidecar_drops_stale_destination_sidecar() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = KeyRecord::new(key_path(&src_dir, "alpha"));
        std::fs::write(src.path(), b"bare secret").unwrap();

        let dst = KeyRecord::create(
            key_path(&dst_dir, "alpha"),
            &Secret::generate(32).unwrap(),
            KeyParams::new(),
        )
        .await
        .unwrap()
        .unwrap();

        src.copy_to(&dst).await.unwrap();
        assert_eq!(std::fs::read(dst.path()).unwrap(), b"bare secret");
        assert!(!dst.params_path().exists());
        assert!(!dst.is_valid().await.unwrap());
        assert!(dst.params().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_artifacts_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;

        let created = KeyRecord::create(
            key_path(&dir, "alpha"),
            &Secret::generate(32).unwrap(),
            KeyParams::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(mode(created.path()), PRIVATE_FILE_MODE);
        assert_eq!(mode(&created.params_path()), PRIVATE_FILE_MODE);

        let replaced = KeyRecord::create_unchecked(
            key_path(&dir, "beta"),
            &Secret::generate(32).unwrap(),
            KeyParams::new(),
        )
        .await
        .unwrap();
        assert_eq!(mode(replaced.path()), PRIVATE_FILE_MODE);
        assert_eq!(mode(&replaced.params_path()), PRIVATE_FILE_MODE);
    }

    #[test]
    fn test_params_path_appends_suffix() {
        let record = KeyRecord::new("/keys/alpha.key");
        assert_eq!(record.params_path(), PathBuf::from("/keys/alpha.key.params"));
        assert_eq!(record.name(), "alpha");
    }
}
