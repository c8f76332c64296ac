use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The normalized dataset: market name → market record.
///
/// All maps are insertion-ordered so facility keys (`facility_1`,
/// `facility_2`, ...) keep their scrape order on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub markets: IndexMap<String, Market>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub name: String,
    pub link: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub facilities: IndexMap<String, Facility>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: String,
    pub address: String,
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub table_info: IndexMap<String, String>,
}

/// Raw scraped dump, as produced by an earlier collection run. Markets keep
/// whatever was captured: multi-line keys, facilities as a bare card array
/// (or junk, which transforms to an empty mapping).
#[derive(Debug, Deserialize)]
pub struct RawDataset {
    pub markets: IndexMap<String, RawMarket>,
}

#[derive(Debug, Deserialize)]
pub struct RawMarket {
    pub link: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub facilities: serde_json::Value,
}

/// A facility link card as scraped from a market page: visible text plus the
/// link target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCard {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct DatasetStats {
    pub markets: usize,
    pub completed_markets: usize,
    pub facilities: usize,
    pub with_table_info: usize,
}

impl Dataset {
    pub fn pending_markets(&self) -> usize {
        self.markets.values().filter(|m| !m.completed).count()
    }

    pub fn facility_count(&self) -> usize {
        self.markets.values().map(|m| m.facilities.len()).sum()
    }

    pub fn stats(&self) -> DatasetStats {
        let mut s = DatasetStats {
            markets: self.markets.len(),
            ..Default::default()
        };
        for market in self.markets.values() {
            if market.completed {
                s.completed_markets += 1;
            }
            s.facilities += market.facilities.len();
            s.with_table_info += market
                .facilities
                .values()
                .filter(|f| !f.table_info.is_empty())
                .count();
        }
        s
    }
}

/// On-disk home of the dataset. Every save is a full rewrite of the document
/// (a checkpoint), staged through a temp file so an interrupted write never
/// clobbers the previous checkpoint.
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Dataset> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read dataset {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid dataset JSON in {}", self.path.display()))
    }

    pub fn save(&self, data: &Dataset) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Read a raw scraped dump (transformer input).
pub fn load_raw(path: &Path) -> Result<RawDataset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read raw dump {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))
}

// ── Tests ──
