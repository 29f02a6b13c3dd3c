//! Raw module export as produced by the course authoring tool.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::bundle::MetadataValue;
use crate::error::MalformedInputError;
use crate::normalizer::NormalizeError;
use crate::text::parse_quoted_list;

/// Module identity block (`key_module_field`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Course identifier, kept as exported (number or string).
    pub course_id: SourceId,
    /// Module (competency) display name.
    pub competency_name: String,
    /// Subject domain.
    pub module_domain: String,
    /// Any further identity fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One raw module export.
#[derive(Debug, Clone, Deserialize)]
pub struct RawModuleExport {
    /// Module identity.
    pub key_module_field: ModuleInfo,
    /// Competency descriptors with their multiple-choice questions.
    #[serde(default)]
    pub question_type_mcq: Option<Vec<McqGroup>>,
    /// Procedural checklists. Absent is valid.
    #[serde(default)]
    pub question_type_checklist: Option<Vec<ChecklistGroup>>,
}

impl RawModuleExport {
    /// Competency groups, empty when the section is missing.
    pub fn mcq_groups(&self) -> &[McqGroup] {
        self.question_type_mcq.as_deref().unwrap_or_default()
    }

    /// Checklist groups, empty when the section is missing.
    pub fn checklist_groups(&self) -> &[ChecklistGroup] {
        self.question_type_checklist.as_deref().unwrap_or_default()
    }

    /// Parses an export from JSON text.
    ///
    /// Accepts either the exporter's array form (first element is the module) or a bare object.
    pub fn from_json_str(input: &str) -> Result<Self, NormalizeError> {
        let value: Value = serde_json::from_str(input).map_err(NormalizeError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Reads and parses an export from disk.
    pub fn from_path(path: &Path) -> Result<Self, NormalizeError> {
        let file = File::open(path).map_err(|source| NormalizeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(NormalizeError::InvalidJson)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, NormalizeError> {
        let module = match value {
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Err(MalformedInputError::new("export array is empty").into());
                }
                items.swap_remove(0)
            }
            other => other,
        };
        if module.get("key_module_field").is_none() {
            return Err(MalformedInputError::new("missing `key_module_field` block").into());
        }
        serde_json::from_value(module)
            .map_err(|err| MalformedInputError::new(err.to_string()).into())
    }
}

/// One competency with its bundled question lists.
#[derive(Debug, Clone, Deserialize)]
pub struct McqGroup {
    /// Competency descriptor.
    pub competency: RawCompetency,
    /// Parallel question lists.
    pub question: RawQuestionLists,
}

/// Competency descriptor as exported.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCompetency {
    /// Stable competency id, kept as exported.
    pub competency_id: SourceId,
    /// Competency type (e.g. Knowledge, Skill).
    pub competency_type: String,
    /// Competency area. The exporter spells the key this way.
    #[serde(rename = "module_compentency_area")]
    pub area: String,
    /// Definition text, possibly containing markup.
    #[serde(rename = "module_competency_definition")]
    pub definition: String,
    /// Quote-wrapped activity names.
    #[serde(default)]
    pub activity_names: String,
}

/// String-encoded parallel lists, index-aligned per question.
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestionLists {
    /// Question ids.
    pub question_ids: QuotedList,
    /// Question stems.
    pub question_texts: QuotedList,
    /// Text of the correct option.
    pub correct_options_texts: QuotedList,
    /// Learning objective per question.
    pub question_id_competency_definition: QuotedList,
    /// Rendered option list per question.
    pub options_texts: QuotedList,
}

/// A list encoded either as `'a', 'b'` text or as a JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QuotedList {
    /// Quote-delimited text.
    Encoded(String),
    /// Already-split items.
    Items(Vec<String>),
}

impl QuotedList {
    /// Ordered items of the list.
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Encoded(text) => parse_quoted_list(text),
            Self::Items(items) => items.clone(),
        }
    }
}

/// One checklist with its ordered steps.
#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistGroup {
    /// Checklist question.
    pub question: RawChecklistQuestion,
    /// Steps in listed order.
    #[serde(default)]
    pub option: Vec<RawStep>,
}

/// Checklist question header.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChecklistQuestion {
    /// Stable question id.
    #[serde(deserialize_with = "string_or_number")]
    pub question_id: String,
    /// Question text.
    pub question_text: String,
}

/// One checklist step.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    /// Position label as exported.
    pub option_sequence: SourceId,
    /// Step text.
    pub option_text: String,
}

/// Identifier or sequence label that keeps its JSON type: numbers stay numbers in metadata
/// and artifacts, and render as their decimal text in ids, paths and templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceId {
    /// Integer as exported.
    Number(i64),
    /// Text as exported.
    Text(String),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&SourceId> for MetadataValue {
    fn from(value: &SourceId) -> Self {
        match value {
            SourceId::Number(n) => Self::Int(*n),
            SourceId::Text(text) => Self::Str(text.clone()),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(num) => Ok(num.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_array_form_with_numeric_ids() {
        let export = RawModuleExport::from_json_str(
            r#"[{
                "key_module_field": {
                    "course_id": 341,
                    "competency_name": "Urinary Catheterization",
                    "module_domain": "Nursing",
                    "module_level": "Beginner"
                },
                "question_type_checklist": [{
                    "question": {"question_id": 9001, "question_text": "Insert a catheter"},
                    "option": [{"option_sequence": 1, "option_text": "Wash hands"}]
                }]
            }]"#,
        )
        .expect("parse export");

        assert_eq!(export.key_module_field.course_id, SourceId::Number(341));
        assert_eq!(export.key_module_field.course_id.to_string(), "341");
        assert_eq!(
            export.key_module_field.extra.get("module_level"),
            Some(&Value::String("Beginner".into()))
        );
        assert!(export.mcq_groups().is_empty());
        let checklist = &export.checklist_groups()[0];
        assert_eq!(checklist.question.question_id, "9001");
        assert_eq!(checklist.option[0].option_sequence, SourceId::Number(1));
    }

    #[test]
    fn identity_keeps_its_json_type_when_written_back() {
        let info: ModuleInfo = serde_json::from_str(
            r#"{"course_id": 341, "competency_name": "M", "module_domain": "D"}"#,
        )
        .unwrap();
        let written = serde_json::to_value(&info).unwrap();
        assert_eq!(written["course_id"], serde_json::json!(341));

        let text: ModuleInfo = serde_json::from_str(
            r#"{"course_id": "A-7", "competency_name": "M", "module_domain": "D"}"#,
        )
        .unwrap();
        assert_eq!(MetadataValue::from(&text.course_id), MetadataValue::from("A-7"));
        assert_eq!(MetadataValue::from(&info.course_id), MetadataValue::Int(341));
    }

    #[test]
    fn missing_identity_block_is_malformed() {
        let err = RawModuleExport::from_json_str(r#"{"question_type_mcq": []}"#)
            .expect_err("identity block required");
        assert!(matches!(err, NormalizeError::Malformed(_)), "got {err:?}");
    }

    #[test]
    fn missing_identity_key_is_malformed() {
        let err = RawModuleExport::from_json_str(
            r#"{"key_module_field": {"course_id": "1", "competency_name": "X"}}"#,
        )
        .expect_err("module_domain required");
        match err {
            NormalizeError::Malformed(inner) => {
                assert!(inner.reason().contains("module_domain"), "{inner}")
            }
            other => panic!("expected malformed input, got {other:?}"),
        }
    }

    #[test]
    fn syntax_errors_are_not_malformed_input() {
        let err = RawModuleExport::from_json_str("{not json").expect_err("bad json");
        assert!(matches!(err, NormalizeError::InvalidJson(_)), "got {err:?}");
    }

    #[test]
    fn quoted_list_accepts_both_encodings() {
        let encoded: QuotedList = serde_json::from_str(r#""'a', 'b'""#).unwrap();
        let items: QuotedList = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(encoded.items(), items.items());
    }
}
