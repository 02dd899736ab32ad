use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Numeric quality metrics tracked per function.
///
/// `hasReturnType` is deliberately not listed here: it is a flag, not a
/// measurement, and has no threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    CyclomaticComplexity,
    CognitiveComplexity,
    LinesOfCode,
    NestingDepth,
    ParameterCount,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::CyclomaticComplexity,
        Metric::CognitiveComplexity,
        Metric::LinesOfCode,
        Metric::NestingDepth,
        Metric::ParameterCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CyclomaticComplexity => "cyclomaticComplexity",
            Metric::CognitiveComplexity => "cognitiveComplexity",
            Metric::LinesOfCode => "linesOfCode",
            Metric::NestingDepth => "nestingDepth",
            Metric::ParameterCount => "parameterCount",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cyclomaticComplexity" => Some(Metric::CyclomaticComplexity),
            "cognitiveComplexity" => Some(Metric::CognitiveComplexity),
            "linesOfCode" => Some(Metric::LinesOfCode),
            "nestingDepth" => Some(Metric::NestingDepth),
            "parameterCount" => Some(Metric::ParameterCount),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics computed by the scanner. `None` means "not computed", never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_of_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cyclomatic_complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nesting_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_return_type: Option<bool>,
}

impl FunctionMetrics {
    pub fn get(&self, metric: Metric) -> Option<u32> {
        match metric {
            Metric::CyclomaticComplexity => self.cyclomatic_complexity,
            Metric::CognitiveComplexity => self.cognitive_complexity,
            Metric::LinesOfCode => self.lines_of_code,
            Metric::NestingDepth => self.nesting_depth,
            Metric::ParameterCount => self.parameter_count,
        }
    }

    pub fn set(&mut self, metric: Metric, value: u32) {
        let slot = match metric {
            Metric::CyclomaticComplexity => &mut self.cyclomatic_complexity,
            Metric::CognitiveComplexity => &mut self.cognitive_complexity,
            Metric::LinesOfCode => &mut self.lines_of_code,
            Metric::NestingDepth => &mut self.nesting_depth,
            Metric::ParameterCount => &mut self.parameter_count,
        };
        *slot = Some(value);
    }

    pub fn with(mut self, metric: Metric, value: u32) -> Self {
        self.set(metric, value);
        self
    }

    pub fn with_return_type(mut self, has_return_type: bool) -> Self {
        self.has_return_type = Some(has_return_type);
        self
    }

    /// True when all five numeric metrics are present.
    pub fn is_complete(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_some())
    }
}

/// Key used to match the same function across two inventories.
///
/// Composition is `(file, identifier, startLine)`. `endLine` is excluded so a
/// function whose body grows or shrinks is matched to its previous version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKey {
    pub file: String,
    pub identifier: String,
    pub start_line: u32,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}@{}", self.file, self.identifier, self.start_line)
    }
}

/// One function/method definition at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRecord {
    pub file: String,
    pub identifier: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub exported: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub content_hash: String,
    #[serde(default)]
    pub file_hash: String,
    #[serde(default)]
    pub metrics: FunctionMetrics,
}

impl FunctionRecord {
    pub fn new(
        file: impl Into<String>,
        identifier: impl Into<String>,
        start_line: u32,
        end_line: u32,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            identifier: identifier.into(),
            start_line,
            end_line,
            signature: String::new(),
            exported: false,
            is_async: false,
            domain: None,
            content_hash: content_hash.into(),
            file_hash: String::new(),
            metrics: FunctionMetrics::default(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_file_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = file_hash.into();
        self
    }

    pub fn with_metrics(mut self, metrics: FunctionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            file: self.file.clone(),
            identifier: self.identifier.clone(),
            start_line: self.start_line,
        }
    }

    /// History key: ignores line numbers so history survives line shifts.
    pub fn function_id(&self) -> String {
        function_id(&self.file, &self.identifier)
    }

    /// Checks the fields serde cannot express as required.
    pub fn validate(&self) -> Result<(), String> {
        if self.file.trim().is_empty() {
            return Err("field `file` must not be empty".to_string());
        }
        if self.identifier.trim().is_empty() {
            return Err("field `identifier` must not be empty".to_string());
        }
        if self.content_hash.trim().is_empty() {
            return Err("field `contentHash` must not be empty".to_string());
        }
        if self.end_line < self.start_line {
            return Err(format!(
                "endLine {} precedes startLine {}",
                self.end_line, self.start_line
            ));
        }
        Ok(())
    }
}

pub fn function_id(file: &str, identifier: &str) -> String {
    format!("{}::{}", file, identifier)
}

/// Computes the xxh3 fingerprint used for content and file hashes.
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

/// Ordered collection of records with unique identity keys.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    records: Vec<FunctionRecord>,
    positions: HashMap<IdentityKey, usize>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inventory; a later record with an existing key replaces the earlier one.
    pub fn from_records(records: impl IntoIterator<Item = FunctionRecord>) -> Self {
        let mut inventory = Self::new();
        for record in records {
            inventory.insert(record);
        }
        inventory
    }

    /// Inserts a record, returning the record it replaced (if any).
    pub fn insert(&mut self, record: FunctionRecord) -> Option<FunctionRecord> {
        let key = record.key();
        match self.positions.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.records[pos], record)),
            None => {
                self.positions.insert(key, self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&FunctionRecord> {
        self.positions.get(key).map(|&pos| &self.records[pos])
    }

    pub fn contains_key(&self, key: &IdentityKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FunctionRecord> {
        self.records
    }

    /// Distinct file paths covered by this inventory.
    pub fn files(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.file.as_str()).collect()
    }

    /// Display order: file, then start line, then identifier.
    pub fn sorted(&self) -> Self {
        let mut records = self.records.clone();
        records.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.start_line.cmp(&b.start_line))
                .then(a.identifier.cmp(&b.identifier))
        });
        Self::from_records(records)
    }
}

impl PartialEq for Inventory {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl FromIterator<FunctionRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = FunctionRecord>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a FunctionRecord;
    type IntoIter = std::slice::Iter<'a, FunctionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str, id: &str, start: u32, hash: &str) -> FunctionRecord {
        FunctionRecord::new(file, id, start, start + 5, hash)
    }

    #[test]
    fn test_metric_names_roundtrip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_str(metric.as_str()), Some(metric));
        }
        assert_eq!(Metric::from_str("loc"), None);
    }

    #[test]
    fn test_metrics_absent_is_not_zero() {
        let metrics = FunctionMetrics::default().with(Metric::LinesOfCode, 0);
        assert_eq!(metrics.get(Metric::LinesOfCode), Some(0));
        assert_eq!(metrics.get(Metric::NestingDepth), None);
        assert!(!metrics.is_complete());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let rec = record("a.ts", "foo", 1, "h1")
            .with_async(true)
            .with_metrics(FunctionMetrics::default().with(Metric::LinesOfCode, 10));
        let json = serde_json::to_value(&rec).unwrap();

        assert_eq!(json["startLine"], 1);
        assert_eq!(json["contentHash"], "h1");
        assert_eq!(json["async"], true);
        assert_eq!(json["metrics"]["linesOfCode"], 10);
        assert!(json["metrics"].get("nestingDepth").is_none());
    }

    #[test]
    fn test_identity_key_ignores_end_line() {
        let a = FunctionRecord::new("a.ts", "foo", 3, 10, "h1");
        let b = FunctionRecord::new("a.ts", "foo", 3, 14, "h2");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.function_id(), "a.ts::foo");
    }

    #[test]
    fn test_validate_rejects_inverted_lines() {
        let rec = FunctionRecord::new("a.ts", "foo", 10, 3, "h1");
        assert!(rec.validate().is_err());
        assert!(record("a.ts", "foo", 1, "h").validate().is_ok());
        assert!(record("a.ts", "", 1, "h").validate().is_err());
    }

    #[test]
    fn test_inventory_replaces_duplicate_keys() {
        let mut inv = Inventory::new();
        assert!(inv.insert(record("a.ts", "foo", 1, "h1")).is_none());
        inv.insert(record("a.ts", "bar", 9, "h2"));
        let replaced = inv.insert(record("a.ts", "foo", 1, "h3"));

        assert_eq!(replaced.map(|r| r.content_hash), Some("h1".to_string()));
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.records()[0].content_hash, "h3");
    }

    #[test]
    fn test_inventory_sorted_and_files() {
        let inv = Inventory::from_records(vec![
            record("b.ts", "z", 1, "h"),
            record("a.ts", "y", 20, "h"),
            record("a.ts", "x", 2, "h"),
        ]);
        let sorted = inv.sorted();
        let ids: Vec<_> = sorted.iter().map(|r| r.identifier.as_str()).collect();

        assert_eq!(ids, vec!["x", "y", "z"]);
        assert_eq!(inv.files().into_iter().collect::<Vec<_>>(), vec!["a.ts", "b.ts"]);
        assert!(sorted.contains_key(&record("a.ts", "y", 20, "h").key()));
    }

    #[test]
    fn test_hash_content_deterministic() {
        assert_eq!(hash_content("fn main() {}"), hash_content("fn main() {}"));
        assert_ne!(hash_content("fn main() {}"), hash_content("fn main() { }"));
        assert_eq!(hash_content("").len(), 16);
    }
}
