//! Tile catalog: turns tile codes and product suffixes into locators.

use crate::error::PipelineError;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Base URL of the Topodata GeoTIFF archive.
pub const TOPODATA_BASE_URL: &str = "http://www.dsr.inpe.br/topodata/data/geotiff/";

/// Produces the ordered locator list a pipeline run starts from.
///
/// Implementations may resolve tiles however they like (a static catalog, a
/// geometry service); the pipeline only sees the resulting locators.
pub trait LocatorSource {
    fn locators(&self, tiles: &[String], suffixes: &[String]) -> Vec<String>;
}

/// One downloadable product for a tile.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Tile code, e.g. `12S45_`.
    pub code: String,
    /// Product suffix, e.g. `ZN`.
    pub suffix: String,
    /// Archive file name relative to the base URL.
    pub file_name: String,
}

/// Catalog of products grouped by tile code.
#[derive(Debug, Clone)]
pub struct TileCatalog {
    base_url: String,
    tiles: BTreeMap<String, Vec<CatalogEntry>>,
}

impl TileCatalog {
    pub fn new(base_url: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        let mut tiles: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
        for entry in entries {
            if entry.code.is_empty() {
                continue;
            }
            tiles.entry(entry.code.clone()).or_default().push(entry);
        }

        Self {
            base_url: base_url.into(),
            tiles,
        }
    }

    /// Loads a CSV catalog from `path`.
    ///
    /// ```csv
    /// code,suffix,file_name
    /// 12S45_,ZN,12S45ZN.zip
    /// 12S45_,SN,12S45SN.zip
    /// ```
    ///
    /// Columns are matched by header name; extra columns are ignored.
    pub fn load(path: &Path, base_url: impl Into<String>) -> Result<Self, PipelineError> {
        let entries = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(path)?
            .deserialize()
            .collect::<Result<Vec<CatalogEntry>, _>>()?;
        info!("Loaded {} catalog entries from {:?}", entries.len(), path);
        Ok(Self::new(base_url, entries))
    }

    /// Number of distinct tile codes.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Requested `(code, suffix)` pairs that have no catalog entry, sorted.
    pub fn missing(&self, tiles: &[String], suffixes: &[String]) -> Vec<(String, String)> {
        let existing: BTreeSet<(&str, &str)> = self
            .tiles
            .values()
            .flatten()
            .map(|e| (e.code.as_str(), e.suffix.as_str()))
            .collect();

        let mut missing = BTreeSet::new();
        for code in tiles {
            for suffix in suffixes {
                if !existing.contains(&(code.as_str(), suffix.as_str())) {
                    missing.insert((code.clone(), suffix.clone()));
                }
            }
        }
        missing.into_iter().collect()
    }
}

impl LocatorSource for TileCatalog {
    /// Locators for every entry of the requested tiles whose suffix is in
    /// `suffixes`, in tile order then catalog order. Unknown tiles are skipped;
    /// use [`TileCatalog::missing`] to report them.
    fn locators(&self, tiles: &[String], suffixes: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        tiles
            .iter()
            .filter(|code| seen.insert(code.as_str()))
            .filter_map(|code| self.tiles.get(code))
            .flatten()
            .filter(|entry| suffixes.iter().any(|s| s == &entry.suffix))
            .map(|entry| format!("{}{}", self.base_url, entry.file_name))
            .collect()
    }
}

/// Human-readable name of a Topodata product suffix.
pub fn suffix_description(suffix: &str) -> Option<&'static str> {
    match suffix {
        "ZN" => Some("altitude"),
        "SN" => Some("slope"),
        "ON" => Some("aspect"),
        "RS" => Some("relief"),
        "FT" => Some("landform"),
        "DD" => Some("drainage divides"),
        "VN" => Some("vertical curvature"),
        "HN" => Some("horizontal curvature"),
        _ => None,
    }
}
