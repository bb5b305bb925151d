//! Interface to the encrypted-volume subsystem
//!
//! The key store never manages volumes itself. Rekey and create drive a
//! `VolumeManager` implementation:
//! - `ZfsCli`, which shells out to the `zfs` command
//! - in-memory doubles in tests
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


use crate::error::KeyResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// Identifier of a volume in the subsystem (e.g. `tank/home`)
pub type VolumeId = String;

/// Property name -> value for one volume
pub type VolumeProperties = BTreeMap<String, String>;

/// Property naming where a volume's key is loaded from
pub const PROP_KEYLOCATION: &str = "keylocation";

/// `keylocation` values meaning the volume has no local key
pub const NO_LOCAL_KEY: [&str; 3] = ["-", "none", ""];

/// Scheme prefix of a `keylocation` pointing at a key file
pub const FILE_LOCATION_PREFIX: &str = "file://";

/// `keylocation` value for a key file
pub fn key_location(key_path: &Path) -> String {
    format!("{}{}", FILE_LOCATION_PREFIX, key_path.display())
}

/// True if the properties describe a volume keyed from a local location
pub fn has_local_key(props: &VolumeProperties) -> bool {
    props
        .get(PROP_KEYLOCATION)
        .is_some_and(|location| !NO_LOCAL_KEY.contains(&location.as_str()))
}

/// Trait for encrypted-volume backends
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// Encryption properties of the selected volumes
    ///
    /// An empty selector list selects every volume. `recursive` includes
    /// descendants of the selected volumes.
    async fn list_volumes(
        &self,
        selectors: &[VolumeId],
        recursive: bool,
    ) -> KeyResult<BTreeMap<VolumeId, VolumeProperties>>;

    /// Point an existing volume at a new key file. Returns false if the subsystem refused.
    async fn rebind_volume_key(&self, volume: &str, key_path: &Path) -> KeyResult<bool>;

    /// Create a volume with the given creation options. Returns false if the subsystem refused.
    async fn create_volume(
        &self,
        volume: &str,
        key_path: &Path,
        options: &[String],
    ) -> KeyResult<bool>;

    /// Selected volumes whose key is loaded from a local location
    async fn list_locally_keyed_volumes(
        &self,
        selectors: &[VolumeId],
        recursive: bool,
    ) -> KeyResult<BTreeMap<VolumeId, VolumeProperties>> {
        let mut volumes = self.list_volumes(selectors, recursive).await?;
        volumes.retain(|_, props| has_local_key(props));
        Ok(volumes)
    }
}
