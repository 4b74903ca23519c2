use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Reference data for one refrigerant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub gwp: Option<f64>,
    pub restricted: bool,
}

impl CatalogEntry {
    pub fn new(code: &str, gwp: Option<f64>, restricted: bool) -> Self {
        Self {
            code: code.to_string(),
            gwp,
            restricted,
        }
    }
}

/// Refrigerant codes mapped to their GWP factors. Lookups ignore case and surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct RefrigerantCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    code: String,
    #[serde(default)]
    gwp: Option<f64>,
    #[serde(default)]
    restricted: Option<String>,
}

fn catalog_key(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn parse_flag(code: &str, raw: Option<&str>) -> Result<bool, CatalogError> {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("false") | Some("no") | Some("0") => Ok(false),
        Some("true") | Some("yes") | Some("1") => Ok(true),
        Some(other) => Err(CatalogError::InvalidFlag {
            code: code.to_string(),
            value: other.to_string(),
        }),
    }
}

impl RefrigerantCatalog {
    pub fn from_entries(
        entries: impl IntoIterator<Item = CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry)?;
        }
        Ok(catalog)
    }

    /// Common ASHRAE refrigerants with AR4 100-year GWP values. HCFCs are flagged restricted.
    pub fn standard() -> Self {
        let entries = [
            ("R-22", 1810.0, true),
            ("R-123", 77.0, true),
            ("R-141b", 725.0, true),
            ("R-142b", 2310.0, true),
            ("R-32", 675.0, false),
            ("R-134a", 1430.0, false),
            ("R-404A", 3922.0, false),
            ("R-407C", 1774.0, false),
            ("R-410A", 2088.0, false),
            ("R-507A", 3985.0, false),
            ("R-1234yf", 4.0, false),
            ("R-290", 3.0, false),
            ("R-600a", 3.0, false),
            ("R-717", 0.0, false),
            ("R-744", 1.0, false),
        ];

        let entries = entries
            .into_iter()
            .map(|(code, gwp, restricted)| {
                (
                    catalog_key(code),
                    CatalogEntry::new(code, Some(gwp), restricted),
                )
            })
            .collect();
        Self { entries }
    }

    /// Load `code,gwp,restricted` rows. A blank GWP column leaves the factor unknown.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut catalog = Self::default();
        for row in csv_reader.deserialize::<CatalogRow>() {
            let row = row?;
            let restricted = parse_flag(&row.code, row.restricted.as_deref())?;
            catalog.insert(CatalogEntry {
                code: row.code.trim().to_string(),
                gwp: row.gwp,
                restricted,
            })?;
        }
        Ok(catalog)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file)
    }

    fn insert(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        if entry.code.trim().is_empty() {
            return Err(CatalogError::MissingCode);
        }
        if let Some(gwp) = entry.gwp {
            if !gwp.is_finite() || gwp < 0.0 {
                return Err(CatalogError::InvalidGwp {
                    code: entry.code,
                    value: gwp,
                });
            }
        }

        let key = catalog_key(&entry.code);
        if self.entries.contains_key(&key) {
            return Err(CatalogError::DuplicateCode(entry.code));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.get(&catalog_key(code))
    }

    pub fn gwp(&self, code: &str) -> Option<f64> {
        self.get(code).and_then(|entry| entry.gwp)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to open catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed catalog row: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog row is missing a refrigerant code")]
    MissingCode,
    #[error("refrigerant {0} appears more than once")]
    DuplicateCode(String),
    #[error("refrigerant {code} has invalid GWP {value}")]
    InvalidGwp { code: String, value: f64 },
    #[error("refrigerant {code} has invalid restricted flag '{value}'")]
    InvalidFlag { code: String, value: String },
}
