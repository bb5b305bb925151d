//! Key type definitions
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
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Component, Path};

/// Logical name of a key within a store
pub type KeyName = String;

/// Caller metadata stored next to a key (string keys, scalar values)
pub type KeyParams = BTreeMap<String, Value>;

/// File suffix that marks a secret artifact
pub const KEY_SUFFIX: &str = ".key";

/// Suffix appended to a secret's path to locate its sidecar
pub const PARAMS_SUFFIX: &str = ".params";

/// Permission bits for secrets, sidecars and reports (owner read/write only)
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Sidecar field holding the hex SHA-256 digest of the secret
pub const PARAM_SHA256_HEX: &str = "sha256_hex";

/// Sidecar field holding the creation time in epoch seconds
pub const PARAM_CREATION_DATE: &str = "creation_date";

/// Sidecar field binding a key to the volume it encrypts
pub const PARAM_VOLUME: &str = "zfs_dataset";

/// On-disk sidecar variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarFormat {
    /// JSON object with digest, creation date and caller params
    Structured,
    /// Bare hex digest, no other metadata
    LegacyDigest,
}

impl SidecarFormat {
    /// Detect which variant a sidecar's contents use
    pub fn detect(contents: &str) -> Option<Self> {
        let trimmed = contents.trim();
        if trimmed.starts_with('{') {
            return Some(SidecarFormat::Structured);
        }
        if is_sha256_hex(trimmed) {
            return Some(SidecarFormat::LegacyDigest);
        }
        None
    }
}

/// Decoded sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct Sidecar {
    pub format: SidecarFormat,
    pub params: KeyParams,
}

impl Sidecar {
    /// Parse sidecar contents, detecting the format first
    ///
    /// A legacy sidecar surfaces as a mapping holding only the digest.
    pub fn parse(contents: &str) -> KeyResult<Self> {
        match SidecarFormat::detect(contents) {
            // Unknown contents go through the JSON parser so the error says why
            Some(SidecarFormat::Structured) | None => Ok(Self {
                format: SidecarFormat::Structured,
                params: serde_json::from_str(contents)?,
            }),
            Some(SidecarFormat::LegacyDigest) => {
                let mut params = KeyParams::new();
                params.insert(
                    PARAM_SHA256_HEX.to_string(),
                    Value::String(contents.trim().to_ascii_lowercase()),
                );
                Ok(Self {
                    format: SidecarFormat::LegacyDigest,
                    params,
                })
            }
        }
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check that a logical name maps onto a single file inside the store root
///
/// Only names that would leave the root (separators, `.`, `..`, roots) or
/// cannot be a file name (empty, NUL) are refused.
pub fn validate_name(name: &str) -> KeyResult<()> {
    let mut components = Path::new(name).components();
    let single_file = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == OsStr::new(name)
    );
    if !single_file || name.contains('\0') {
        return Err(KeyError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// True if a directory entry name follows the `<name>.key` convention
///
/// Compared on raw bytes so names that are not valid UTF-8 still count.
pub fn is_key_file_name(file_name: &OsStr) -> bool {
    let bytes = file_name.as_encoded_bytes();
    bytes.len() > KEY_SUFFIX.len() && bytes.ends_with(KEY_SUFFIX.as_bytes())
}

/// Read the digest field from a mapping
pub fn digest_of(params: &KeyParams) -> Option<&str> {
    params.get(PARAM_SHA256_HEX).and_then(Value::as_str)
}

/// Read the creation date field from a mapping, accepting integer or float seconds
pub fn creation_date_of(params: &KeyParams) -> Option<i64> {
    let value = params.get(PARAM_CREATION_DATE)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
}
