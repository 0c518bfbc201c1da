//! Operational frequency band table
//!
//! Bands are read from CSV files with a header row and `band,lower,upper`
//! columns in hertz, one table for regular devices and one for FHSS devices.
//! The first band containing the centre frequency wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::FrequencyBandLookup;

/// A regulatory frequency band
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyBand {
    #[serde(rename = "band")]
    pub name: String,
    #[serde(rename = "lower")]
    pub lower_edge: u64,
    #[serde(rename = "upper")]
    pub upper_edge: u64,
}

impl FrequencyBand {
    pub fn new(name: impl Into<String>, lower_edge: u64, upper_edge: u64) -> Self {
        Self {
            name: name.into(),
            lower_edge,
            upper_edge,
        }
    }

    pub fn contains(&self, frequency: u64) -> bool {
        self.lower_edge <= frequency && frequency <= self.upper_edge
    }
}

/// Band lookup backed by in-memory tables
#[derive(Clone, Debug, Default)]
pub struct BandTable {
    bands: Vec<FrequencyBand>,
    fhss_bands: Vec<FrequencyBand>,
}

impl BandTable {
    pub fn new(bands: Vec<FrequencyBand>, fhss_bands: Vec<FrequencyBand>) -> Self {
        Self { bands, fhss_bands }
    }

    /// Short range device bands used when no CSV table is configured
    pub fn builtin() -> Self {
        Self::new(
            vec![
                FrequencyBand::new("169.4-169.475 MHz", 169_400_000, 169_475_000),
                FrequencyBand::new("169.4-169.8125 MHz", 169_400_000, 169_812_500),
                FrequencyBand::new("433.05-434.79 MHz", 433_050_000, 434_790_000),
                FrequencyBand::new("863-865 MHz", 863_000_000, 865_000_000),
                FrequencyBand::new("865-868 MHz", 865_000_000, 868_000_000),
                FrequencyBand::new("868.0-868.6 MHz", 868_000_000, 868_600_000),
                FrequencyBand::new("868.7-869.2 MHz", 868_700_000, 869_200_000),
                FrequencyBand::new("869.4-869.65 MHz", 869_400_000, 869_650_000),
                FrequencyBand::new("869.7-870 MHz", 869_700_000, 870_000_000),
            ],
            vec![
                FrequencyBand::new("433.05-434.79 MHz", 433_050_000, 434_790_000),
                FrequencyBand::new("863-870 MHz", 863_000_000, 870_000_000),
            ],
        )
    }

    /// Load the regular table and, optionally, the FHSS table from CSV files
    pub fn load(path: impl AsRef<Path>, fhss_path: Option<&Path>) -> Result<Self> {
        let bands = read_csv_file(path.as_ref())?;
        let fhss_bands = match fhss_path {
            Some(p) => read_csv_file(p)?,
            None => Vec::new(),
        };
        Ok(Self::new(bands, fhss_bands))
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn fhss_bands(&self) -> &[FrequencyBand] {
        &self.fhss_bands
    }
}

impl FrequencyBandLookup for BandTable {
    fn band_for(&self, center_frequency: u64, fhss: bool) -> Option<FrequencyBand> {
        let table = if fhss { &self.fhss_bands } else { &self.bands };
        let band = table.iter().find(|b| b.contains(center_frequency)).cloned();
        debug!(
            "Band lookup for {} Hz (FHSS: {}): {:?}",
            center_frequency,
            fhss,
            band.as_ref().map(|b| &b.name)
        );
        band
    }
}

fn read_csv_file(path: &Path) -> Result<Vec<FrequencyBand>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open band table: {}", path.display()))?;
    read_csv(file).with_context(|| format!("Failed to parse band table: {}", path.display()))
}

/// Parse a band table; the first row is a header and is skipped
pub fn read_csv(reader: impl Read) -> Result<Vec<FrequencyBand>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bands = Vec::new();
    for record in rdr.records() {
        let record = record.context("Malformed CSV record")?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        let lower_edge = field(1)
            .parse()
            .with_context(|| format!("Invalid lower edge '{}' for band '{}'", field(1), field(0)))?;
        let upper_edge = field(2)
            .parse()
            .with_context(|| format!("Invalid upper edge '{}' for band '{}'", field(2), field(0)))?;
        bands.push(FrequencyBand::new(field(0), lower_edge, upper_edge));
    }

    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const TABLE: &str = "band,lower,upper\n\
                         A,433050000,434790000\n\
                         B,868000000,868600000\n\
                         C,863000000,870000000\n";

    #[test]
    fn test_read_csv() {
        let bands = read_csv(TABLE.as_bytes()).unwrap();
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0], FrequencyBand::new("A", 433_050_000, 434_790_000));
    }

    #[test]
    fn test_read_csv_invalid_number() {
        let err = read_csv("band,lower,upper\nX,abc,10\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid lower edge"));
    }

    #[test]
    fn test_first_match_wins() {
        let table = BandTable::new(read_csv(TABLE.as_bytes()).unwrap(), Vec::new());
        let band = table.band_for(868_300_000, false).unwrap();
        assert_eq!(band.name, "B");
        assert_eq!(table.band_for(865_000_000, false).unwrap().name, "C");
    }

    #[test]
    fn test_edges_are_inclusive() {
        let table = BandTable::new(read_csv(TABLE.as_bytes()).unwrap(), Vec::new());
        assert!(table.band_for(433_050_000, false).is_some());
        assert!(table.band_for(434_790_000, false).is_some());
        assert!(table.band_for(434_790_001, false).is_none());
    }

    #[test]
    fn test_fhss_uses_separate_table() {
        let table = BandTable::new(
            Vec::new(),
            vec![FrequencyBand::new("F", 863_000_000, 870_000_000)],
        );
        assert!(table.band_for(868_300_000, false).is_none());
        assert_eq!(table.band_for(868_300_000, true).unwrap().name, "F");
    }

    #[test]
    fn test_builtin_contains_reference_channel() {
        let band = BandTable::builtin().band_for(169_612_500, false).unwrap();
        assert_eq!(band.lower_edge, 169_400_000);
        assert_eq!(band.upper_edge, 169_812_500);
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        let fhss_path = dir.path().join("bands_fhss.csv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(TABLE.as_bytes())
            .unwrap();
        std::fs::write(&fhss_path, "band,lower,upper\nF,863000000,870000000\n").unwrap();

        let table = BandTable::load(&path, Some(fhss_path.as_path())).unwrap();
        assert_eq!(table.bands().len(), 3);
        assert_eq!(table.fhss_bands().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(BandTable::load("/nonexistent/bands.csv", None).is_err());
    }
}
