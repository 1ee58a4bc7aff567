//! Channel metadata table (channel id -> short name and description).
//!
//! Readers take an `Arc` snapshot of an immutable map; `reload` parses the
//! file into a fresh map and swaps it in whole, so a lookup never sees a
//! half-updated table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PreviewError, Result};

const ENHANCED_MARKER: &str = "_enhanced";
const MISSING_DESCRIPTION: &str = "Description not available.";
const MISSING_SHORTNAME: &str = "Shortname not available.";
const ENHANCED_DESCRIPTION_NOTE: &str =
    " This enhanced version may provide higher resolution images for more precise use.";
const ENHANCED_SHORTNAME_NOTE: &str = " (Enhanced)";

/// One row of the channel table. Both fields may be absent in the file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Short display name, e.g. `Clean IR`.
    #[serde(default)]
    pub shortname: Option<String>,
    /// Longer human description.
    #[serde(default)]
    pub description: Option<String>,
}

type ChannelMap = HashMap<String, ChannelRecord>;

/// Reloadable channel id -> [`ChannelRecord`] table backed by a JSON file.
#[derive(Debug)]
pub struct ChannelTable {
    path: PathBuf,
    snapshot: RwLock<Arc<ChannelMap>>,
}

impl ChannelTable {
    /// Table backed by `path` with no records yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(Arc::new(ChannelMap::new())),
        }
    }

    /// Read and parse `path`. Fails if the file is missing or not valid JSON.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let table = Self::empty(path);
        table.reload().await?;
        Ok(table)
    }

    /// Table with fixed `records`; `reload` still reads `path`.
    pub fn from_records(path: impl Into<PathBuf>, records: ChannelMap) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(Arc::new(records)),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of channels in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// True when the current snapshot has no channels.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<ChannelMap> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the table with the file's current contents. On failure the
    /// previous snapshot stays in place.
    pub async fn reload(&self) -> Result<usize> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|err| PreviewError::ChannelTable(format!("{}: {err}", self.path.display())))?;
        let records: ChannelMap = serde_json::from_slice(&raw)
            .map_err(|err| PreviewError::ChannelTable(format!("{}: {err}", self.path.display())))?;

        let count = records.len();
        *self.snapshot.write() = Arc::new(records);
        info!(path = %self.path.display(), channels = count, "channel table reloaded");
        Ok(count)
    }

    /// Like [`reload`](Self::reload) but only logs failures.
    pub async fn reload_or_keep(&self) {
        if let Err(err) = self.reload().await {
            warn!(error = %err, "keeping previous channel table");
        }
    }

    /// Human description of `channel`, or `None` for an unknown channel.
    pub fn describe(&self, channel: &str) -> Option<String> {
        let (record, enhanced) = self.lookup(channel)?;
        let mut text = non_empty(record.description).unwrap_or_else(|| MISSING_DESCRIPTION.to_string());
        if enhanced {
            text.push_str(ENHANCED_DESCRIPTION_NOTE);
        }
        Some(text)
    }

    /// Short display name of `channel`, or `None` for an unknown channel.
    pub fn shortname(&self, channel: &str) -> Option<String> {
        let (record, enhanced) = self.lookup(channel)?;
        let mut text = non_empty(record.shortname).unwrap_or_else(|| MISSING_SHORTNAME.to_string());
        if enhanced {
            text.push_str(ENHANCED_SHORTNAME_NOTE);
        }
        Some(text)
    }

    /// Record for the base channel (first `_enhanced` marker removed) and
    /// whether the marker was present.
    fn lookup(&self, channel: &str) -> Option<(ChannelRecord, bool)> {
        let enhanced = channel.contains(ENHANCED_MARKER);
        let base = if enhanced {
            channel.replacen(ENHANCED_MARKER, "", 1)
        } else {
            channel.to_string()
        };
        self.snapshot()
            .get(&base)
            .cloned()
            .map(|record| (record, enhanced))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table() -> ChannelTable {
        let records = HashMap::from([
            (
                "ch13".to_string(),
                ChannelRecord {
                    shortname: Some("Clean IR".into()),
                    description: Some("Clean longwave infrared window.".into()),
                },
            ),
            (
                "ch02".to_string(),
                ChannelRecord {
                    shortname: None,
                    description: Some(String::new()),
                },
            ),
        ]);
        ChannelTable::from_records("goes16.map.json", records)
    }

    #[test]
    fn plain_lookup() {
        let table = table();
        assert_eq!(table.shortname("ch13").as_deref(), Some("Clean IR"));
        assert_eq!(
            table.describe("ch13").as_deref(),
            Some("Clean longwave infrared window.")
        );
        assert_eq!(table.describe("ch99"), None);
    }

    #[test]
    fn enhanced_marker_is_stripped_and_annotated() {
        let table = table();
        assert_eq!(
            table.shortname("ch13_enhanced").as_deref(),
            Some("Clean IR (Enhanced)")
        );
        assert_eq!(
            table.describe("ch13_enhanced").unwrap(),
            format!("Clean longwave infrared window.{ENHANCED_DESCRIPTION_NOTE}")
        );
        assert_eq!(table.shortname("ch99_enhanced"), None);
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let table = table();
        assert_eq!(table.shortname("ch02").as_deref(), Some(MISSING_SHORTNAME));
        assert_eq!(table.describe("ch02").as_deref(), Some(MISSING_DESCRIPTION));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("goes16.map.json");
        std::fs::write(&path, r#"{"ch07": {"shortname": "Shortwave IR"}}"#).unwrap();

        let table = ChannelTable::load(&path).await.unwrap();
        assert_eq!(table.len(), 1);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            table.reload().await,
            Err(PreviewError::ChannelTable(_))
        ));
        assert_eq!(table.shortname("ch07").as_deref(), Some("Shortwave IR"));

        std::fs::write(
            &path,
            r#"{"ch07": {"shortname": "SWIR"}, "ch08": {"description": "Water vapor"}}"#,
        )
        .unwrap();
        assert_eq!(table.reload().await.unwrap(), 2);
        assert_eq!(table.shortname("ch07").as_deref(), Some("SWIR"));
    }

    #[tokio::test]
    async fn load_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ChannelTable::load(dir.path().join("absent.json")).await.is_err());
    }
}
