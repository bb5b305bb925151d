//! Raw key material
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
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default secret length in bytes (256-bit keys)
pub const DEFAULT_SECRET_LEN: usize = 32;

/// Immutable sequence of raw key bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    value: Vec<u8>,
}

impl Secret {
    /// Generate a new secret of `len` bytes from the OS random source
    pub fn generate(len: usize) -> KeyResult<Self> {
        if len == 0 {
            return Err(KeyError::InvalidLength(len));
        }
        let mut value = vec![0u8; len];
        OsRng.fill_bytes(&mut value);
        Ok(Self { value })
    }

    /// Decode a secret from its hex encoding
    pub fn from_hex(hex_str: &str) -> KeyResult<Self> {
        Ok(Self {
            value: hex::decode(hex_str)?,
        })
    }

    /// Raw key bytes
    pub fn raw(&self) -> &[u8] {
        &self.value
    }

    /// Lowercase hex encoding
    pub fn hex(&self) -> String {
        hex::encode(&self.value)
    }

    /// Lowercase hex SHA-256 digest of the raw bytes
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.value))
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl From<Vec<u8>> for Secret {
    fn from(value: Vec<u8>) -> Self {
        Self { value }
    }
}

impl From<&[u8]> for Secret {
    fn from(value: &[u8]) -> Self {
        Self {
            value: value.to_vec(),
        }
    }
}

// Never print key material
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.value.len())
            .finish_non_exhaustive()
    }
}
