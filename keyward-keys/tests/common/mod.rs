//! Shared fixtures for key store integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use keyward_keys::{KeyResult, VolumeId, VolumeManager, VolumeProperties};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Calls observed by `RecordingVolumes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeCall {
    List { selectors: Vec<VolumeId>, recursive: bool },
    Rebind { volume: VolumeId, key_path: PathBuf },
    Create { volume: VolumeId, key_path: PathBuf, options: Vec<String> },
}

/// In-memory volume subsystem that records every call
#[derive(Default)]
pub struct RecordingVolumes {
    volumes: BTreeMap<VolumeId, VolumeProperties>,
    refuse: Vec<VolumeId>,
    calls: Mutex<Vec<VolumeCall>>,
}

impl RecordingVolumes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an encrypted volume with the given `keylocation`
    pub fn with_volume(mut self, volume: &str, keylocation: &str) -> Self {
        let mut props = VolumeProperties::new();
        props.insert("encryption".to_string(), "aes-256-gcm".to_string());
        props.insert("keylocation".to_string(), keylocation.to_string());
        props.insert("keyformat".to_string(), "raw".to_string());
        self.volumes.insert(volume.to_string(), props);
        self
    }

    /// Make rebind/create fail for `volume`
    pub fn refusing(mut self, volume: &str) -> Self {
        self.refuse.push(volume.to_string());
        self
    }

    pub fn calls(&self) -> Vec<VolumeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rebinds(&self) -> Vec<(VolumeId, PathBuf)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                VolumeCall::Rebind { volume, key_path } => Some((volume, key_path)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: VolumeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VolumeManager for RecordingVolumes {
    async fn list_volumes(
        &self,
        selectors: &[VolumeId],
        recursive: bool,
    ) -> KeyResult<BTreeMap<VolumeId, VolumeProperties>> {
        self.record(VolumeCall::List {
            selectors: selectors.to_vec(),
            recursive,
        });
        let selected = self
            .volumes
            .iter()
            .filter(|(name, _)| {
                selectors.is_empty()
                    || selectors.iter().any(|sel| {
                        *name == sel || (recursive && name.starts_with(&format!("{}/", sel)))
                    })
            })
            .map(|(name, props)| (name.clone(), props.clone()))
            .collect();
        Ok(selected)
    }

    async fn rebind_volume_key(&self, volume: &str, key_path: &Path) -> KeyResult<bool> {
        self.record(VolumeCall::Rebind {
            volume: volume.to_string(),
            key_path: key_path.to_path_buf(),
        });
        Ok(!self.refuse.iter().any(|v| v == volume))
    }

    async fn create_volume(
        &self,
        volume: &str,
        key_path: &Path,
        options: &[String],
    ) -> KeyResult<bool> {
        self.record(VolumeCall::Create {
            volume: volume.to_string(),
            key_path: key_path.to_path_buf(),
            options: options.to_vec(),
        });
        Ok(!self.refuse.iter().any(|v| v == volume))
    }
}
