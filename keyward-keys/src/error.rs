//! Error types for key management
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


use std::path::PathBuf;
use thiserror::Error;

/// Key management errors
///
/// A missing key or a key that fails its digest check is not an error: the
/// checked accessors report those as `Ok(None)` / `Ok(false)`.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid key name: {0:?}")]
    InvalidName(String),

    #[error("Invalid key length: {0} (must be positive)")]
    InvalidLength(usize),

    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Volume subsystem error: {0}")]
    Volume(String),
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;
