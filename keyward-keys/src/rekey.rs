//! Key rotation and creation for encrypted volumes
//!
//! Both flows mint a fresh key in a store, tagged with the volume it belongs
//! to, and then ask the volume subsystem to use it. Nothing is rolled back if
//! the subsystem refuses: the minted key stays in the store, unused.
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
use crate::key_store::KeyStore;
use crate::key_types::{is_key_file_name, KeyName, KeyParams, PARAM_VOLUME};
use crate::record::KeyRecord;
use crate::secret::{Secret, DEFAULT_SECRET_LEN};
use crate::volume::{
    key_location, VolumeId, VolumeManager, FILE_LOCATION_PREFIX, PROP_KEYLOCATION,
};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Store argument that requests a dry run
pub const DRY_RUN_SENTINEL: &str = "-";

/// Cipher every new volume is created with
pub const VOLUME_ENCRYPTION: &str = "aes-256-gcm";

/// Where rekeyed keys go
#[derive(Debug, Clone)]
pub enum KeyDestination {
    /// Report targets only; mint nothing, rebind nothing
    DryRun,
    Store(KeyStore),
}

impl KeyDestination {
    /// Resolve a store argument; `-` means dry run, anything else must be an existing store
    pub async fn resolve(arg: &str) -> KeyResult<Self> {
        if arg == DRY_RUN_SENTINEL {
            return Ok(KeyDestination::DryRun);
        }
        match KeyStore::open(arg).await? {
            Some(store) => Ok(KeyDestination::Store(store)),
            None => Err(KeyError::StoreNotFound(PathBuf::from(arg))),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, KeyDestination::DryRun)
    }
}

/// A key minted for a volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedKey {
    pub name: KeyName,
    /// Canonical path handed to the volume subsystem
    pub path: PathBuf,
}

/// What happened to one rekey target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyAction {
    /// Dry run: would have been rekeyed
    Planned,
    Rebound(MintedKey),
    /// The key was minted but the subsystem refused it; the key is orphaned
    RebindFailed(MintedKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyEntry {
    pub volume: VolumeId,
    pub action: RekeyAction,
}

/// Per-volume results of a rekey run, in volume order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RekeyReport {
    pub entries: Vec<RekeyEntry>,
}

impl RekeyReport {
    pub fn failures(&self) -> impl Iterator<Item = &RekeyEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, RekeyAction::RebindFailed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// A locally keyed volume whose key file lives in a given store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedVolume {
    pub volume: VolumeId,
    pub key_name: KeyName,
    pub key_valid: bool,
}

/// Mandatory creation options for a volume keyed from `key_path`
pub fn encryption_options(key_path: &Path) -> Vec<String> {
    vec![
        format!("encryption={}", VOLUME_ENCRYPTION),
        format!("keylocation={}", key_location(key_path)),
        "keyformat=raw".to_string(),
    ]
}

/// Drives a `VolumeManager` against key stores
pub struct VolumeKeyManager {
    volumes: Arc<dyn VolumeManager>,
    key_len: usize,
}

impl VolumeKeyManager {
    pub fn new(volumes: Arc<dyn VolumeManager>) -> Self {
        Self {
            volumes,
            key_len: DEFAULT_SECRET_LEN,
        }
    }

    /// Byte length of minted secrets
    pub fn with_key_len(mut self, key_len: usize) -> Self {
        self.key_len = key_len;
        self
    }

    /// Generate and store a fresh key bound to `volume`
    ///
    /// The name is a random UUID, so a collision is reported as an error
    /// rather than retried.
    pub async fn mint_key(&self, store: &KeyStore, volume: &str) -> KeyResult<MintedKey> {
        let name = Uuid::new_v4().simple().to_string();
        let secret = Secret::generate(self.key_len)?;

        let mut params = KeyParams::new();
        params.insert(PARAM_VOLUME.to_string(), Value::from(volume));

        let record = store
            .add_key(&name, &secret, params)
            .await?
            .ok_or_else(|| KeyError::AlreadyExists(name.clone()))?;
        let path = record.absolute_path().await?;
        Ok(MintedKey { name, path })
    }

    /// Give every selected locally keyed volume a new key
    ///
    /// An empty `selectors` list selects all volumes. A refused rebind is
    /// recorded and the remaining volumes are still processed.
    pub async fn rekey(
        &self,
        dest: &KeyDestination,
        selectors: &[VolumeId],
        recursive: bool,
    ) -> KeyResult<RekeyReport> {
        let targets = self
            .volumes
            .list_locally_keyed_volumes(selectors, recursive)
            .await?;

        let mut report = RekeyReport::default();
        for volume in targets.into_keys() {
            let action = match dest {
                KeyDestination::DryRun => {
                    info!(volume = %volume, "Would rekey");
                    RekeyAction::Planned
                }
                KeyDestination::Store(store) => {
                    let key = self.mint_key(store, &volume).await?;
                    info!(volume = %volume, key = %key.name, "Rekeying");
                    if self.volumes.rebind_volume_key(&volume, &key.path).await? {
                        RekeyAction::Rebound(key)
                    } else {
                        warn!(
                            volume = %volume,
                            key = %key.name,
                            "Rebind refused, new key left unused in store"
                        );
                        RekeyAction::RebindFailed(key)
                    }
                }
            };
            report.entries.push(RekeyEntry { volume, action });
        }
        Ok(report)
    }

    /// Mint a key for `volume` and create the volume with it
    ///
    /// `options` are appended after the mandatory encryption options.
    pub async fn create_volume(
        &self,
        store: &KeyStore,
        volume: &str,
        options: &[String],
    ) -> KeyResult<MintedKey> {
        let key = self.mint_key(store, volume).await?;
        info!(volume = volume, key = %key.name, "Creating encrypted volume");

        let mut all_options = encryption_options(&key.path);
        all_options.extend(options.iter().cloned());

        if self
            .volumes
            .create_volume(volume, &key.path, &all_options)
            .await?
        {
            Ok(key)
        } else {
            warn!(volume = volume, key = %key.name, "Volume creation refused, new key left unused in store");
            Err(KeyError::Volume(format!(
                "failed to create {} (key {} left in store)",
                volume, key.name
            )))
        }
    }

    /// Locally keyed volumes whose key file is in `store`
    pub async fn keyed_volumes(&self, store: &KeyStore) -> KeyResult<Vec<KeyedVolume>> {
        let root = fs::canonicalize(store.root()).await?;
        let volumes = self.volumes.list_locally_keyed_volumes(&[], false).await?;

        let mut keyed = Vec::new();
        for (volume, props) in volumes {
            let Some(location) = props.get(PROP_KEYLOCATION) else {
                continue;
            };
            let Some(file_name) = key_file_in(&root, location).await else {
                continue;
            };
            let record = KeyRecord::new(store.root().join(file_name));
            keyed.push(KeyedVolume {
                volume,
                key_name: record.name(),
                key_valid: record.is_valid().await?,
            });
        }
        Ok(keyed)
    }
}

/// File name of a `file://` key location directly inside the canonical `root`
///
/// The location's directory is canonicalized when it exists, so symlinked or
/// unnormalized spellings of the store root still match.
async fn key_file_in(root: &Path, location: &str) -> Option<OsString> {
    let path = Path::new(location.strip_prefix(FILE_LOCATION_PREFIX)?);
    let file_name = path.file_name()?;
    if !is_key_file_name(file_name) {
        return None;
    }
    let parent = path.parent()?;
    let parent = fs::canonicalize(parent)
        .await
        .unwrap_or_else(|_| parent.to_path_buf());
    (parent == root).then(|| file_name.to_os_string())
}
