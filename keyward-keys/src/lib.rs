//! Key store for encrypted volume keys
//!
//! Keeps raw volume keys on the local filesystem with integrity sidecars,
//! backs stores up without overwriting live keys, and rotates or creates
//! encrypted volumes through a pluggable volume subsystem.
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


pub mod backup;
pub mod error;
pub mod key_store;
pub mod key_types;
pub mod record;
pub mod rekey;
pub mod report;
pub mod secret;
pub mod volume;
pub mod zfs;

pub use backup::{backup, BackupMode, BackupOutcome};
pub use error::{KeyError, KeyResult};
pub use key_store::KeyStore;
pub use key_types::{KeyName, KeyParams, SidecarFormat};
pub use record::KeyRecord;
pub use rekey::{KeyDestination, MintedKey, RekeyAction, RekeyReport, VolumeKeyManager};
pub use secret::Secret;
pub use volume::{VolumeId, VolumeManager, VolumeProperties};
pub use zfs::ZfsCli;
