//! Printable key listings for offline recovery
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
use std::io::Write;

/// One key as it appears in a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub name: KeyName,
    /// Hex secret; `None` when the secret file is missing
    pub hex: Option<String>,
}

impl ReportEntry {
    /// Text meant for a scannable code: `"<name> <hex>"`
    pub fn payload(&self) -> String {
        format!("{} {}", self.name, self.hex.as_deref().unwrap_or(""))
    }
}

/// Every record in the store, valid or not
pub async fn collect_report(store: &KeyStore) -> KeyResult<Vec<ReportEntry>> {
    let mut entries = Vec::new();
    for record in store.all_keys().await? {
        entries.push(ReportEntry {
            name: record.name(),
            hex: record.secret().await?.map(|s| s.hex()),
        });
    }
    Ok(entries)
}

/// Output format for reports
pub trait ReportRenderer {
    fn render(&self, entries: &[ReportEntry], out: &mut dyn Write) -> std::io::Result<()>;
}

/// Plain-text listing, one block per key
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportRenderer;

impl ReportRenderer for TextReportRenderer {
    fn render(&self, entries: &[ReportEntry], out: &mut dyn Write) -> std::io::Result<()> {
        for entry in entries {
            writeln!(out, "Name: {}", entry.name)?;
            match &entry.hex {
                Some(hex) => writeln!(out, "Key: {}", hex)?,
                None => writeln!(out, "Key: <missing>")?,
            }
            writeln!(out, "Code: {}", entry.payload())?;
            writeln!(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_renderer() {
        let entries = vec![
            ReportEntry {
                name: "alpha".to_string(),
                hex: Some("00ff".to_string()),
            },
            ReportEntry {
                name: "beta".to_string(),
                hex: None,
            },
        ];
        let mut out = Vec::new();
        TextReportRenderer.render(&entries, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Name: alpha\nKey: 00ff\nCode: alpha 00ff\n"));
        assert!(text.contains("Name: beta\nKey: <missing>\n"));
    }
}
