//! `VolumeManager` backed by the `zfs` command-line tool
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
use crate::volume::{key_location, VolumeId, VolumeManager, VolumeProperties};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Properties requested when listing volumes
const ENCRYPTION_PROPS: &str = "encryption,keylocation,keyformat";

/// ZFS datasets managed through the `zfs` binary
#[derive(Debug, Clone)]
pub struct ZfsCli {
    binary: PathBuf,
}

impl ZfsCli {
    /// Use `binary` (a path, or a name resolved through `PATH`)
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a command that only reports success or failure
    async fn run_status(&self, args: &[String]) -> KeyResult<bool> {
        debug!(binary = %self.binary.display(), ?args, "Running zfs");
        let status = Command::new(&self.binary).args(args).status().await?;
        if !status.success() {
            warn!(code = ?status.code(), ?args, "zfs command failed");
        }
        Ok(status.success())
    }
}

impl Default for ZfsCli {
    fn default() -> Self {
        Self::new("zfs")
    }
}

#[async_trait]
impl VolumeManager for ZfsCli {
    async fn list_volumes(
        &self,
        selectors: &[VolumeId],
        recursive: bool,
    ) -> KeyResult<BTreeMap<VolumeId, VolumeProperties>> {
        let flags = if recursive { "-rH" } else { "-H" };
        let output = Command::new(&self.binary)
            .arg("get")
            .arg(flags)
            .arg(ENCRYPTION_PROPS)
            .args(selectors)
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(KeyError::Volume(format!("zfs get failed: {}", error.trim())));
        }

        parse_encryption_info(&String::from_utf8_lossy(&output.stdout))
    }

    async fn rebind_volume_key(&self, volume: &str, key_path: &Path) -> KeyResult<bool> {
        info!(volume = volume, key_path = %key_path.display(), "Changing zfs key");
        let args = vec![
            "change-key".to_string(),
            "-o".to_string(),
            format!("keylocation={}", key_location(key_path)),
            "-o".to_string(),
            "keyformat=raw".to_string(),
            volume.to_string(),
        ];
        self.run_status(&args).await
    }

    async fn create_volume(
        &self,
        volume: &str,
        key_path: &Path,
        options: &[String],
    ) -> KeyResult<bool> {
        info!(volume = volume, key_path = %key_path.display(), "Creating zfs dataset");
        let mut args = vec!["create".to_string()];
        for option in options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(volume.to_string());
        self.run_status(&args).await
    }
}

/// Parse `zfs get -H` output (`name<TAB>property<TAB>value<TAB>source` per line)
pub fn parse_encryption_info(output: &str) -> KeyResult<BTreeMap<VolumeId, VolumeProperties>> {
    let mut info: BTreeMap<VolumeId, VolumeProperties> = BTreeMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(KeyError::Volume(format!(
                "Unexpected zfs get output line: {:?}",
                line
            )));
        }
        info.entry(fields[0].to_string())
            .or_default()
            .insert(fields[1].to_string(), fields[2].to_string());
    }
    Ok(info)
}
