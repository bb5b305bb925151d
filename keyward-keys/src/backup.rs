//! Copy every key from one store to another without clobbering live keys
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
use crate::key_store::KeyStore;
use crate::key_types::KeyName;
use tracing::{info, warn};

/// Collision policy for a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupMode {
    /// Abort if any destination key with a source name is currently valid
    #[default]
    Safe,
    /// Overwrite destination keys unconditionally
    Force,
}

/// Result of a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Names copied, in order
    Copied(Vec<KeyName>),
    /// Nothing was copied; these destination keys would have been overwritten
    Collisions(Vec<KeyName>),
}

/// Copy all records of `source` into `dest`
///
/// Records are copied one at a time. An I/O error part-way through leaves the
/// keys copied so far in place.
pub async fn backup(
    source: &KeyStore,
    dest: &KeyStore,
    mode: BackupMode,
) -> KeyResult<BackupOutcome> {
    let mut pairs = Vec::new();
    for src in source.all_keys().await? {
        let dst = dest.counterpart(&src)?;
        pairs.push((src, dst));
    }

    if mode == BackupMode::Safe {
        let mut collisions = Vec::new();
        for (_, dst) in &pairs {
            if dst.is_valid().await? {
                collisions.push(dst.name());
            }
        }
        if !collisions.is_empty() {
            warn!(
                count = collisions.len(),
                dest = %dest.root().display(),
                "Backup aborted, destination already holds valid keys"
            );
            return Ok(BackupOutcome::Collisions(collisions));
        }
    }

    let mut copied = Vec::with_capacity(pairs.len());
    for (src, dst) in &pairs {
        src.copy_to(dst).await?;
        copied.push(src.name());
    }

    info!(
        count = copied.len(),
        source = %source.root().display(),
        dest = %dest.root().display(),
        "Backup complete"
    );
    Ok(BackupOutcome::Copied(copied))
}
