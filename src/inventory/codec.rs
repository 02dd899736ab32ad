//! Line codec for persisted inventories.
//!
//! Each line is one JSON object. Two shapes are accepted:
//! - current records (`identifier`, `contentHash`, nested `metrics`)
//! - pre-v2 records (`name`, `filePath`, `hash`, flat metric fields), which are
//!   migrated to the current shape while decoding

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LineError, Result};
use crate::inventory::{FunctionMetrics, FunctionRecord};

/// Record layout written before metrics were nested.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    file_path: String,
    name: String,
    start_line: u32,
    end_line: u32,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    is_exported: bool,
    #[serde(default)]
    is_async: bool,
    #[serde(default)]
    domain: Option<String>,
    hash: String,
    #[serde(default)]
    file_hash: String,
    #[serde(default)]
    loc: Option<u32>,
    #[serde(default)]
    complexity: Option<u32>,
    #[serde(default)]
    cognitive_complexity: Option<u32>,
    #[serde(default)]
    max_nesting: Option<u32>,
    #[serde(default)]
    param_count: Option<u32>,
    #[serde(default)]
    has_return_type: Option<bool>,
}

impl From<LegacyRecord> for FunctionRecord {
    fn from(legacy: LegacyRecord) -> Self {
        FunctionRecord {
            file: legacy.file_path,
            identifier: legacy.name,
            start_line: legacy.start_line,
            end_line: legacy.end_line,
            signature: legacy.signature,
            exported: legacy.is_exported,
            is_async: legacy.is_async,
            domain: legacy.domain,
            content_hash: legacy.hash,
            file_hash: legacy.file_hash,
            metrics: FunctionMetrics {
                lines_of_code: legacy.loc,
                cyclomatic_complexity: legacy.complexity,
                cognitive_complexity: legacy.cognitive_complexity,
                nesting_depth: legacy.max_nesting,
                parameter_count: legacy.param_count,
                has_return_type: legacy.has_return_type,
            },
        }
    }
}

/// Decodes one line. `line_no` is 1-based and only used for error reporting.
pub fn decode_line(line_no: usize, line: &str) -> std::result::Result<FunctionRecord, LineError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| LineError::parse(line_no, e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| LineError::schema(line_no, "expected a JSON object"))?;

    let is_legacy = !object.contains_key("identifier") && object.contains_key("name");

    let record = if is_legacy {
        serde_json::from_value::<LegacyRecord>(value).map(FunctionRecord::from)
    } else {
        serde_json::from_value::<FunctionRecord>(value)
    }
    .map_err(|e| LineError::schema(line_no, e.to_string()))?;

    record
        .validate()
        .map_err(|msg| LineError::schema(line_no, msg))?;

    Ok(record)
}

/// Decodes a whole document, splitting good records from malformed lines.
/// Blank lines are ignored.
pub fn decode_all(content: &str) -> (Vec<FunctionRecord>, Vec<LineError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(idx + 1, line) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(e),
        }
    }

    (records, errors)
}

pub fn encode_record(record: &FunctionRecord) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LineErrorKind;
    use crate::inventory::Metric;

    #[test]
    fn test_decode_current_record() {
        let line = r#"{"file":"a.ts","identifier":"foo","startLine":1,"endLine":4,"contentHash":"h1","metrics":{"linesOfCode":4}}"#;
        let rec = decode_line(1, line).unwrap();

        assert_eq!(rec.identifier, "foo");
        assert_eq!(rec.metrics.get(Metric::LinesOfCode), Some(4));
        assert_eq!(rec.metrics.get(Metric::CyclomaticComplexity), None);
    }

    #[test]
    fn test_decode_legacy_record_migrates() {
        let line = r#"{"filePath":"src/a.ts","name":"Svc.run","startLine":3,"endLine":9,"hash":"abc","isAsync":true,"loc":7,"complexity":2,"maxNesting":1,"paramCount":0}"#;
        let rec = decode_line(1, line).unwrap();

        assert_eq!(rec.file, "src/a.ts");
        assert_eq!(rec.identifier, "Svc.run");
        assert_eq!(rec.content_hash, "abc");
        assert!(rec.is_async);
        assert_eq!(rec.metrics.lines_of_code, Some(7));
        assert_eq!(rec.metrics.cyclomatic_complexity, Some(2));
        assert_eq!(rec.metrics.nesting_depth, Some(1));
        assert_eq!(rec.metrics.parameter_count, Some(0));
        assert_eq!(rec.metrics.cognitive_complexity, None);
    }

    #[test]
    fn test_decode_invalid_json_is_parse_error() {
        let err = decode_line(7, "{not json").unwrap_err();
        assert_eq!(err.kind, LineErrorKind::Parse);
        assert_eq!(err.line, 7);
    }

    #[test]
    fn test_decode_missing_field_is_schema_error() {
        let err = decode_line(2, r#"{"file":"a.ts","identifier":"foo","startLine":1}"#).unwrap_err();
        assert_eq!(err.kind, LineErrorKind::Schema);

        let err = decode_line(3, "[1,2,3]").unwrap_err();
        assert_eq!(err.kind, LineErrorKind::Schema);
    }

    #[test]
    fn test_decode_all_skips_blank_lines() {
        let content = concat!(
            r#"{"file":"a.ts","identifier":"foo","startLine":1,"endLine":2,"contentHash":"h"}"#,
            "\n\n   \n",
            "garbage\n",
            r#"{"file":"a.ts","identifier":"bar","startLine":5,"endLine":6,"contentHash":"h"}"#,
            "\n"
        );
        let (records, errors) = decode_all(content);

        assert_eq!(records.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
    }

    #[test]
    fn test_encode_then_decode_preserves_record() {
        let rec = FunctionRecord::new("a.ts", "foo", 1, 2, "h")
            .with_domain("billing")
            .with_metrics(FunctionMetrics::default().with_return_type(false));
        let line = encode_record(&rec).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode_line(1, &line).unwrap(), rec);
    }
}
