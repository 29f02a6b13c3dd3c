//! Canonical records and the intermediate module bundle shared by both stages.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::raw::ModuleInfo;

/// Flat scalar metadata attached to each record. Sorted keys keep the artifact stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata value; structured data is pre-encoded as JSON strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer count or id.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Str(String),
}

impl MetadataValue {
    /// Borrowed string when this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Reads a user-supplied value. JSON scalars keep their type (`4`, `true`, `1.5`, and
    /// `"4"` for a quoted string); anything else is taken as plain text.
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str(raw.trim()).unwrap_or_else(|_| Self::Str(raw.to_string()))
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// Record kind, also stored as the `doc_type` metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Competency descriptor.
    Competency,
    /// Multiple-choice question.
    Mcq,
    /// Procedural checklist.
    Checklist,
}

impl RecordKind {
    /// Value written to `doc_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Competency => "competency",
            Self::Mcq => "mcq",
            Self::Checklist => "checklist",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(id, embedding_text, metadata)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Upsert key, unique within a module by caller contract.
    pub id: String,
    /// Bounded plain text submitted for embedding.
    pub embedding_text: String,
    /// Flat filter/display fields.
    pub metadata: Metadata,
}

/// Intermediate artifact written by the normalizer and read by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleBundle {
    /// Module identity.
    pub module_info: ModuleInfo,
    /// Competency records.
    pub competencies: Vec<CanonicalRecord>,
    /// Question records.
    pub mcqs: Vec<CanonicalRecord>,
    /// Checklist records.
    #[serde(default)]
    pub checklists: Vec<CanonicalRecord>,
    /// Record count as declared at write time.
    pub total_vectors: usize,
}

impl ModuleBundle {
    /// Builds a bundle and derives `total_vectors`.
    pub fn new(
        module_info: ModuleInfo,
        competencies: Vec<CanonicalRecord>,
        mcqs: Vec<CanonicalRecord>,
        checklists: Vec<CanonicalRecord>,
    ) -> Self {
        let total_vectors = competencies.len() + mcqs.len() + checklists.len();
        Self {
            module_info,
            competencies,
            mcqs,
            checklists,
            total_vectors,
        }
    }

    /// Records actually carried, regardless of `total_vectors`.
    pub fn record_count(&self) -> usize {
        self.competencies.len() + self.mcqs.len() + self.checklists.len()
    }

    /// All records: competencies, then questions, then checklists.
    pub fn records(&self) -> impl Iterator<Item = (RecordKind, &CanonicalRecord)> {
        self.competencies
            .iter()
            .map(|record| (RecordKind::Competency, record))
            .chain(self.mcqs.iter().map(|record| (RecordKind::Mcq, record)))
            .chain(
                self.checklists
                    .iter()
                    .map(|record| (RecordKind::Checklist, record)),
            )
    }

    /// Artifact file name for a course.
    pub fn file_name(course_id: &str) -> String {
        format!("processed_module_{course_id}.json")
    }

    /// Writes the bundle as indented UTF-8 JSON under `output_dir`, creating the directory.
    ///
    /// The file is written to a temporary sibling and renamed into place, so a failed
    /// write never leaves a partial artifact behind.
    pub fn write_to_dir(&self, output_dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(Self::file_name(&self.module_info.course_id.to_string()));
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Reads a bundle written by [`ModuleBundle::write_to_dir`].
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let bundle = serde_json::from_reader(BufReader::new(file))?;
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::SourceId;
    use pretty_assertions::assert_eq;

    fn module_info() -> ModuleInfo {
        ModuleInfo {
            course_id: SourceId::Number(341),
            competency_name: "Urinary Catheterization".into(),
            module_domain: "Nursing".into(),
            extra: BTreeMap::new(),
        }
    }

    fn record(id: &str) -> CanonicalRecord {
        let mut metadata = Metadata::new();
        metadata.insert("doc_type".into(), "mcq".into());
        metadata.insert("question_count".into(), 3usize.into());
        CanonicalRecord {
            id: id.into(),
            embedding_text: format!("Question: {id}"),
            metadata,
        }
    }

    #[test]
    fn lenient_parse_keeps_json_scalar_types() {
        assert_eq!(MetadataValue::parse_lenient("4"), MetadataValue::Int(4));
        assert_eq!(MetadataValue::parse_lenient("true"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::parse_lenient("0.5"), MetadataValue::Float(0.5));
        assert_eq!(MetadataValue::parse_lenient(r#""4""#), MetadataValue::from("4"));
        assert_eq!(MetadataValue::parse_lenient("mcq"), MetadataValue::from("mcq"));
        assert_eq!(MetadataValue::parse_lenient("Q-501"), MetadataValue::from("Q-501"));
        assert_eq!(MetadataValue::parse_lenient("[1]"), MetadataValue::from("[1]"));
    }

    #[test]
    fn records_iterate_in_kind_order() {
        let bundle = ModuleBundle::new(
            module_info(),
            vec![record("c1")],
            vec![record("q1"), record("q2")],
            vec![record("k1")],
        );
        let order: Vec<_> = bundle
            .records()
            .map(|(kind, record)| (kind, record.id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (RecordKind::Competency, "c1"),
                (RecordKind::Mcq, "q1"),
                (RecordKind::Mcq, "q2"),
                (RecordKind::Checklist, "k1"),
            ]
        );
        assert_eq!(bundle.total_vectors, 4);
    }

    #[test]
    fn writes_into_nested_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output_dir = dir.path().join("data").join("preprocessed");
        let bundle = ModuleBundle::new(module_info(), vec![record("c1")], Vec::new(), Vec::new());

        let path = bundle.write_to_dir(&output_dir).expect("write bundle");
        assert_eq!(path, output_dir.join("processed_module_341.json"));
        assert!(!output_dir.join("processed_module_341.json.tmp").exists());

        let raw = fs::read_to_string(&path).expect("read artifact");
        assert!(raw.contains("\n  \"module_info\": {"));
        assert!(raw.contains("\"course_id\": 341"));
        let reread = ModuleBundle::read_from(&path).expect("read bundle");
        assert_eq!(reread, bundle);
        assert_eq!(
            reread.competencies[0].metadata.get("question_count"),
            Some(&MetadataValue::Int(3))
        );
    }
}
