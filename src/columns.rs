//! Column resolution
//!
//! Maps the six logical fields onto physical CSV headers. Both the configured
//! names and the file's headers go through the same normalization, so
//! `"Occurred At"`, `"occurred-at"` and `"OCCURRED_AT"` all match.

use crate::error::RiskModelError;
use crate::types::LogicalColumn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Normalize a column name for matching.
///
/// Strips a leading byte-order mark, trims, lower-cases, treats `-` and `/`
/// as spaces, collapses every run of characters outside `[a-z0-9]` into one
/// underscore and trims underscores from both ends. Returns `None` when
/// nothing is left.
pub fn normalize_column_name(raw: &str) -> Option<String> {
    let stripped = raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw);
    let lowered = stripped.trim().to_lowercase().replace(['-', '/'], " ");

    let mut normalized = String::with_capacity(lowered.len());
    let mut in_separator = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            normalized.push(ch);
            in_separator = false;
        } else if !in_separator {
            normalized.push('_');
            in_separator = true;
        }
    }

    let trimmed = normalized.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Fully populated logical → physical column mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalColumnMap {
    columns: BTreeMap<LogicalColumn, String>,
}

impl Default for LogicalColumnMap {
    fn default() -> Self {
        ColumnResolver::resolve(&BTreeMap::new())
    }
}

impl LogicalColumnMap {
    /// Physical (normalized) column name for a logical field
    pub fn get(&self, column: LogicalColumn) -> &str {
        self.columns
            .get(&column)
            .map(String::as_str)
            .unwrap_or_else(|| column.as_str())
    }

    /// Iterate the mapping in logical-column order
    pub fn iter(&self) -> impl Iterator<Item = (LogicalColumn, &str)> {
        self.columns.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Resolves partial column overrides into a [`LogicalColumnMap`]
pub struct ColumnResolver;

impl ColumnResolver {
    /// Resolve overrides against the defaults.
    ///
    /// Each logical column uses its override when it normalizes to something
    /// non-empty, otherwise the normalized logical name itself.
    pub fn resolve(overrides: &BTreeMap<LogicalColumn, String>) -> LogicalColumnMap {
        let columns = LogicalColumn::ALL
            .iter()
            .map(|&column| {
                let default = column.as_str();
                let physical = overrides
                    .get(&column)
                    .and_then(|name| normalize_column_name(name))
                    .or_else(|| normalize_column_name(default))
                    .unwrap_or_else(|| default.to_string());
                (column, physical)
            })
            .collect();

        LogicalColumnMap { columns }
    }

    /// Resolve overrides keyed by logical column name (e.g. from a config file)
    pub fn resolve_named(overrides: &HashMap<String, String>) -> Result<LogicalColumnMap, RiskModelError> {
        let mut typed = BTreeMap::new();
        for (logical, physical) in overrides {
            let column = LogicalColumn::parse(logical).ok_or_else(|| {
                RiskModelError::InvalidConfig(format!("unknown logical column '{logical}'"))
            })?;
            typed.insert(column, physical.clone());
        }
        Ok(Self::resolve(&typed))
    }
}

/// Normalized header name → field index for one CSV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Build the index from the raw header cells.
    ///
    /// Repeated names get `_2`, `_3`, … suffixes in order of appearance.
    /// Cells that normalize to nothing are named `column_<n>` (1-based).
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names = Vec::new();
        let mut positions = HashMap::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (idx, raw) in headers.into_iter().enumerate() {
            let base = normalize_column_name(raw).unwrap_or_else(|| format!("column_{}", idx + 1));

            let occurrences = seen.entry(base.clone()).or_insert(0);
            *occurrences += 1;
            let mut suffix = *occurrences;
            let mut name = if suffix > 1 {
                format!("{base}_{suffix}")
            } else {
                base.clone()
            };
            // a literal header such as `risk_2` may already hold the candidate
            while positions.contains_key(&name) {
                suffix += 1;
                name = format!("{base}_{suffix}");
            }

            positions.insert(name.clone(), idx);
            names.push(name);
        }

        Self { names, positions }
    }

    /// Field index of a normalized column name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Normalized, deduplicated header names in file order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Field indices of the logical columns in one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndexes {
    pub timestamp: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub category: usize,
    pub risk: Option<usize>,
    pub label: Option<usize>,
}

impl ColumnIndexes {
    /// Locate every logical column in the header.
    ///
    /// Fails with [`RiskModelError::MissingColumn`] naming the first required
    /// column that has no matching header.
    pub fn locate(map: &LogicalColumnMap, header: &HeaderIndex) -> Result<Self, RiskModelError> {
        let required = |column: LogicalColumn| {
            let physical = map.get(column);
            header.position(physical).ok_or_else(|| {
                RiskModelError::MissingColumn(format!("{column} (expected header '{physical}')"))
            })
        };

        Ok(Self {
            timestamp: required(LogicalColumn::Timestamp)?,
            latitude: required(LogicalColumn::Latitude)?,
            longitude: required(LogicalColumn::Longitude)?,
            category: required(LogicalColumn::Category)?,
            risk: header.position(map.get(LogicalColumn::Risk)),
            label: header.position(map.get(LogicalColumn::Label)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("\u{feff}Timestamp").as_deref(), Some("timestamp"));
        assert_eq!(normalize_column_name("  Occurred At ").as_deref(), Some("occurred_at"));
        assert_eq!(normalize_column_name("lat/long").as_deref(), Some("lat_long"));
        assert_eq!(normalize_column_name("risk-score (%)").as_deref(), Some("risk_score"));
        assert_eq!(normalize_column_name("__Label__").as_deref(), Some("label"));
        assert_eq!(normalize_column_name(" -- "), None);
        assert_eq!(normalize_column_name(""), None);
    }

    #[test]
    fn test_resolver_defaults() {
        let map = ColumnResolver::resolve(&BTreeMap::new());
        for column in LogicalColumn::ALL {
            assert_eq!(map.get(column), column.as_str());
        }
    }

    #[test]
    fn test_resolver_overrides_and_fallbacks() {
        let mut overrides = BTreeMap::new();
        overrides.insert(LogicalColumn::Timestamp, "Occurred At".to_string());
        overrides.insert(LogicalColumn::Risk, "Risk-Score".to_string());
        overrides.insert(LogicalColumn::Label, "  ".to_string());
        overrides.insert(LogicalColumn::Category, "!!!".to_string());

        let map = ColumnResolver::resolve(&overrides);
        assert_eq!(map.get(LogicalColumn::Timestamp), "occurred_at");
        assert_eq!(map.get(LogicalColumn::Risk), "risk_score");
        assert_eq!(map.get(LogicalColumn::Label), "label");
        assert_eq!(map.get(LogicalColumn::Category), "category");
        assert_eq!(map.get(LogicalColumn::Latitude), "latitude");
    }

    #[test]
    fn test_resolve_named_rejects_unknown_column() {
        let mut overrides = HashMap::new();
        overrides.insert("severity".to_string(), "sev".to_string());
        let result = ColumnResolver::resolve_named(&overrides);
        assert!(matches!(result, Err(RiskModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_header_index_deduplicates() {
        let header = HeaderIndex::from_headers(["Risk", "risk", "RISK", "", "Category"]);
        assert_eq!(
            header.names(),
            &["risk", "risk_2", "risk_3", "column_4", "category"]
        );
        assert_eq!(header.position("risk_3"), Some(2));
        assert_eq!(header.position("category"), Some(4));
    }

    #[test]
    fn test_header_index_suffix_never_shadows_literal_header() {
        let header = HeaderIndex::from_headers(["risk", "risk", "risk_2"]);
        assert_eq!(header.names(), &["risk", "risk_2", "risk_2_2"]);
        assert_eq!(header.position("risk_2"), Some(1));
        assert_eq!(header.position("risk_2_2"), Some(2));

        let header = HeaderIndex::from_headers(["risk_2", "risk", "risk"]);
        assert_eq!(header.names(), &["risk_2", "risk", "risk_3"]);
        assert_eq!(header.position("risk_2"), Some(0));
    }

    #[test]
    fn test_locate_missing_required_column() {
        let header = HeaderIndex::from_headers(["timestamp", "longitude", "category"]);
        let result = ColumnIndexes::locate(&LogicalColumnMap::default(), &header);
        match result {
            Err(RiskModelError::MissingColumn(msg)) => assert!(msg.contains("latitude")),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_locate_optional_columns() {
        let header =
            HeaderIndex::from_headers(["Timestamp", "Latitude", "Longitude", "Category", "Label"]);
        let indexes = ColumnIndexes::locate(&LogicalColumnMap::default(), &header).unwrap();
        assert_eq!(indexes.timestamp, 0);
        assert_eq!(indexes.category, 3);
        assert_eq!(indexes.risk, None);
        assert_eq!(indexes.label, Some(4));
    }
}
