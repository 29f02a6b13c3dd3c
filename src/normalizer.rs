//! Normalization of raw module exports into canonical embedding records.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::Formatter;
use thiserror::Error;

use crate::bundle::{CanonicalRecord, Metadata, ModuleBundle, RecordKind};
use crate::config::{PipelineConfig, DEFAULT_MAX_CHARS};
use crate::error::{MalformedInputError, PipelineWarning};
use crate::raw::{
    ChecklistGroup, McqGroup, ModuleInfo, RawCompetency, RawModuleExport, SourceId,
};
use crate::text::{char_len, strip_markup, strip_quotes, truncate_chars};

/// Normalization tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct NormalizationConfig {
    /// Character budget for every embedding text.
    pub max_chars: usize,
    /// Learning objectives listed in a competency's embedding text.
    pub max_objectives: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_objectives: 10,
        }
    }
}

impl From<&PipelineConfig> for NormalizationConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_chars: config.max_chars(),
            ..Self::default()
        }
    }
}

/// Errors surfaced by the normalizer stage.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A required structural key was missing or inconsistent.
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
    /// The input file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// Input path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The input was not valid JSON.
    #[error("input is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The bundle could not be written.
    #[error("failed to write bundle into {dir:?}: {source}")]
    Write {
        /// Output directory.
        dir: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Bundle plus the warnings raised while building it.
#[derive(Debug, Clone)]
pub struct NormalizedModule {
    /// Canonical records grouped by kind.
    pub bundle: ModuleBundle,
    /// Non-fatal signals (truncations, compressions, id collisions).
    pub warnings: Vec<PipelineWarning>,
}

/// Stateless module normalization service.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
}

impl Normalizer {
    /// Builds a new normalizer instance.
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// Transforms one raw export into a bundle. Nothing is written.
    pub fn normalize(&self, export: &RawModuleExport) -> Result<NormalizedModule, NormalizeError> {
        let module = &export.key_module_field;
        tracing::info!(
            course_id = %module.course_id,
            module = %module.competency_name,
            "normalizing module"
        );

        let mut session = Session::new(&self.config, module);

        let mut columns = Vec::with_capacity(export.mcq_groups().len());
        for group in export.mcq_groups() {
            columns.push(QuestionColumns::from_group(group)?);
        }

        let competencies: Vec<_> = export
            .mcq_groups()
            .iter()
            .zip(&columns)
            .map(|(group, cols)| session.render_competency(&group.competency, cols))
            .collect();
        tracing::info!(count = competencies.len(), "competencies processed");

        let mcqs: Vec<_> = export
            .mcq_groups()
            .iter()
            .zip(&columns)
            .flat_map(|(group, cols)| session.render_questions(&group.competency, cols))
            .collect();
        tracing::info!(count = mcqs.len(), "mcq questions processed");

        let checklists: Vec<_> = export
            .checklist_groups()
            .iter()
            .map(|group| session.render_checklist(group))
            .collect();
        tracing::info!(count = checklists.len(), "checklists processed");

        let bundle = ModuleBundle::new(module.clone(), competencies, mcqs, checklists);
        Ok(NormalizedModule {
            bundle,
            warnings: session.warnings,
        })
    }
}

/// Reads `config.input_path()`, normalizes it and writes the bundle under `config.output_dir()`.
pub fn run(config: &PipelineConfig) -> Result<(PathBuf, NormalizedModule), NormalizeError> {
    tracing::info!(input = ?config.input_path(), "loading raw module export");
    let export = RawModuleExport::from_path(config.input_path())?;
    let normalized = Normalizer::new(NormalizationConfig::from(config)).normalize(&export)?;
    let path = write_bundle(&normalized.bundle, config.output_dir())?;
    let bundle = &normalized.bundle;
    tracing::info!(
        total = bundle.total_vectors,
        competencies = bundle.competencies.len(),
        mcqs = bundle.mcqs.len(),
        checklists = bundle.checklists.len(),
        path = ?path,
        "processing complete"
    );
    Ok((path, normalized))
}

fn write_bundle(bundle: &ModuleBundle, dir: &Path) -> Result<PathBuf, NormalizeError> {
    bundle
        .write_to_dir(dir)
        .map_err(|source| NormalizeError::Write {
            dir: dir.to_path_buf(),
            source,
        })
}

/// Parallel question lists of one group, checked for equal length.
struct QuestionColumns {
    ids: Vec<String>,
    texts: Vec<String>,
    correct: Vec<String>,
    objectives: Vec<String>,
    options: Vec<String>,
}

impl QuestionColumns {
    fn from_group(group: &McqGroup) -> Result<Self, MalformedInputError> {
        let lists = &group.question;
        let columns = Self {
            ids: lists.question_ids.items(),
            texts: lists.question_texts.items(),
            correct: lists.correct_options_texts.items(),
            objectives: lists.question_id_competency_definition.items(),
            options: lists.options_texts.items(),
        };
        let expected = columns.ids.len();
        let lengths = [
            ("question_texts", columns.texts.len()),
            ("correct_options_texts", columns.correct.len()),
            ("question_id_competency_definition", columns.objectives.len()),
            ("options_texts", columns.options.len()),
        ];
        if lengths.iter().any(|(_, len)| *len != expected) {
            let detail = lengths
                .iter()
                .map(|(name, len)| format!("{name}={len}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(MalformedInputError::new(format!(
                "competency {}: question lists differ in length (question_ids={expected}, {detail})",
                group.competency.competency_id
            )));
        }
        Ok(columns)
    }
}

/// Per-run rendering state: module identity, id tracking and collected warnings.
struct Session<'a> {
    config: &'a NormalizationConfig,
    module: &'a ModuleInfo,
    seen_ids: HashSet<String>,
    warnings: Vec<PipelineWarning>,
}

impl<'a> Session<'a> {
    fn new(config: &'a NormalizationConfig, module: &'a ModuleInfo) -> Self {
        Self {
            config,
            module,
            seen_ids: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    fn render_competency(
        &mut self,
        competency: &RawCompetency,
        columns: &QuestionColumns,
    ) -> CanonicalRecord {
        let definition = strip_markup(&competency.definition).into_owned();
        let activities = strip_quotes(&competency.activity_names);
        let assessed = columns
            .objectives
            .iter()
            .take(self.config.max_objectives)
            .map(|objective| format!("- {objective}"))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!(
            "Competency: {area}\nType: {kind}\n\nDefinition: {definition}\n\n\
             This competency assesses:\n{assessed}\n\nActivities: {activities}",
            area = competency.area,
            kind = competency.competency_type,
        );

        let mut metadata = Metadata::new();
        metadata.insert("doc_type".into(), RecordKind::Competency.as_str().into());
        metadata.insert("competency_id".into(), (&competency.competency_id).into());
        metadata.insert("competency_type".into(), competency.competency_type.clone().into());
        metadata.insert("module_compentency_area".into(), competency.area.clone().into());
        metadata.insert("module_competency_definition".into(), definition.into());
        metadata.insert("activity_names".into(), activities.into());
        metadata.insert("question_ids".into(), encode_json(&columns.ids).into());
        metadata.insert("question_count".into(), columns.ids.len().into());
        self.tag_module(&mut metadata);

        self.finish(
            RecordKind::Competency,
            competency.competency_id.to_string(),
            text,
            metadata,
        )
    }

    fn render_questions(
        &mut self,
        competency: &RawCompetency,
        columns: &QuestionColumns,
    ) -> Vec<CanonicalRecord> {
        let mut records = Vec::with_capacity(columns.ids.len());
        for (idx, id) in columns.ids.iter().enumerate() {
            let question = &columns.texts[idx];
            let correct = &columns.correct[idx];
            let objective = &columns.objectives[idx];
            let options = &columns.options[idx];
            let text = format!(
                "Question: {question}\nCorrect Answer: {correct}\nLearning Objective: {objective}\n\
                 All Options: {options}\nCompetency: {area} ({kind})",
                area = competency.area,
                kind = competency.competency_type,
            );

            let mut metadata = Metadata::new();
            metadata.insert("doc_type".into(), RecordKind::Mcq.as_str().into());
            metadata.insert("question_id".into(), id.clone().into());
            metadata.insert("question_text".into(), question.clone().into());
            metadata.insert("options_text".into(), options.clone().into());
            metadata.insert("correct_option_text".into(), correct.clone().into());
            metadata.insert(
                "question_id_competency_definition".into(),
                objective.clone().into(),
            );
            metadata.insert("competency_id".into(), (&competency.competency_id).into());
            metadata.insert("competency_type".into(), competency.competency_type.clone().into());
            metadata.insert("module_compentency_area".into(), competency.area.clone().into());
            self.tag_module(&mut metadata);

            records.push(self.finish(RecordKind::Mcq, id.clone(), text, metadata));
        }
        records
    }

    fn render_checklist(&mut self, group: &ChecklistGroup) -> CanonicalRecord {
        let question = &group.question;
        let steps_text = group
            .option
            .iter()
            .map(|step| format!("{}. {}", step.option_sequence, step.option_text))
            .collect::<Vec<_>>()
            .join("\n");

        let mut text = format!(
            "Procedural Checklist: {}\nCompetency: Procedural Skills (Skill)\n\
             Correct sequence ({} steps):\n{steps_text}",
            question.question_text,
            group.option.len(),
        );
        if char_len(&text) > self.config.max_chars {
            self.warn(PipelineWarning::ChecklistCompressed {
                id: question.question_id.clone(),
            });
            text = format!("{}\nSteps:\n{steps_text}", question.question_text);
        }

        let steps: Vec<StepRecord<'_>> = group
            .option
            .iter()
            .map(|step| StepRecord {
                step_number: &step.option_sequence,
                step_text: &step.option_text,
            })
            .collect();

        let mut metadata = Metadata::new();
        metadata.insert("doc_type".into(), RecordKind::Checklist.as_str().into());
        metadata.insert("question_id".into(), question.question_id.clone().into());
        metadata.insert("question_text".into(), question.question_text.clone().into());
        metadata.insert("total_steps".into(), group.option.len().into());
        metadata.insert("steps".into(), encode_json(&steps).into());
        metadata.insert("competency_type".into(), "Skill".into());
        self.tag_module(&mut metadata);

        self.finish(
            RecordKind::Checklist,
            question.question_id.clone(),
            text,
            metadata,
        )
    }

    fn tag_module(&self, metadata: &mut Metadata) {
        metadata.insert("course_id".into(), (&self.module.course_id).into());
        metadata.insert(
            "competency_name".into(),
            self.module.competency_name.clone().into(),
        );
        metadata.insert(
            "module_domain".into(),
            self.module.module_domain.clone().into(),
        );
    }

    fn finish(
        &mut self,
        kind: RecordKind,
        id: String,
        text: String,
        metadata: Metadata,
    ) -> CanonicalRecord {
        let (embedding_text, original) = truncate_chars(text, self.config.max_chars);
        if let Some(original_chars) = original {
            self.warn(PipelineWarning::Truncated {
                kind,
                id: id.clone(),
                original_chars,
                max_chars: self.config.max_chars,
            });
        }
        if !self.seen_ids.insert(id.clone()) {
            self.warn(PipelineWarning::DuplicateId {
                id: id.clone(),
                kind,
            });
        }
        CanonicalRecord {
            id,
            embedding_text,
            metadata,
        }
    }

    fn warn(&mut self, warning: PipelineWarning) {
        self.warnings.push(warning.emit());
    }
}

#[derive(Serialize)]
struct StepRecord<'a> {
    step_number: &'a SourceId,
    step_text: &'a str,
}

/// Encodes list metadata the way Python's `json.dumps` does, so string values match
/// collections built by the earlier tooling byte for byte.
fn encode_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, DumpsFormatter);
    // Only strings and integers reach here; serialization is infallible.
    if value.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}

/// `", "` / `": "` separators and `\uXXXX` escapes for every non-ASCII character.
struct DumpsFormatter;

impl Formatter for DumpsFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::MetadataValue;
    use pretty_assertions::assert_eq;

    fn export(json: &str) -> RawModuleExport {
        RawModuleExport::from_json_str(json).expect("valid export")
    }

    fn sample() -> RawModuleExport {
        export(
            r#"[{
                "key_module_field": {
                    "course_id": "341",
                    "competency_name": "Urinary Catheterization",
                    "module_domain": "Nursing"
                },
                "question_type_mcq": [{
                    "competency": {
                        "competency_id": "C-1",
                        "competency_type": "Knowledge",
                        "module_compentency_area": "Catheter Care",
                        "module_competency_definition": "<p><b>balloon</b> inflation</p>",
                        "activity_names": "'Quiz', 'Lab'"
                    },
                    "question": {
                        "question_ids": "'Q-1', 'Q-2'",
                        "question_texts": "'How much water?', 'Which size?'",
                        "correct_options_texts": "'10 ml', '14 Fr'",
                        "question_id_competency_definition": "'Inflate safely', 'Pick a size'",
                        "options_texts": "'5 ml | 10 ml', '12 Fr | 14 Fr'"
                    }
                }],
                "question_type_checklist": [{
                    "question": {"question_id": 77, "question_text": "Insert a catheter"},
                    "option": [
                        {"option_sequence": 1, "option_text": "Wash hands"},
                        {"option_sequence": 2, "option_text": "Explain procedure"}
                    ]
                }]
            }]"#,
        )
    }

    #[test]
    fn partitions_records_by_kind() {
        let normalized = Normalizer::new(NormalizationConfig::default())
            .normalize(&sample())
            .expect("normalize");
        let bundle = normalized.bundle;

        assert_eq!(bundle.competencies.len(), 1);
        assert_eq!(bundle.mcqs.len(), 2);
        assert_eq!(bundle.checklists.len(), 1);
        assert_eq!(bundle.total_vectors, 4);
        assert!(normalized.warnings.is_empty());

        let ids: Vec<_> = bundle.records().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["C-1", "Q-1", "Q-2", "77"]);
    }

    #[test]
    fn renders_competency_template_and_metadata() {
        let bundle = Normalizer::new(NormalizationConfig::default())
            .normalize(&sample())
            .expect("normalize")
            .bundle;
        let competency = &bundle.competencies[0];

        assert_eq!(
            competency.embedding_text,
            "Competency: Catheter Care\nType: Knowledge\n\nDefinition: balloon inflation\n\n\
             This competency assesses:\n- Inflate safely\n- Pick a size\n\nActivities: Quiz, Lab"
        );
        let meta = &competency.metadata;
        assert_eq!(meta["doc_type"], MetadataValue::from("competency"));
        assert_eq!(meta["question_ids"], MetadataValue::from(r#"["Q-1", "Q-2"]"#));
        assert_eq!(meta["question_count"], MetadataValue::Int(2));
        assert_eq!(meta["module_competency_definition"], MetadataValue::from("balloon inflation"));
        assert_eq!(meta["course_id"], MetadataValue::from("341"));
    }

    #[test]
    fn renders_question_at_each_index() {
        let bundle = Normalizer::new(NormalizationConfig::default())
            .normalize(&sample())
            .expect("normalize")
            .bundle;
        let second = &bundle.mcqs[1];

        assert_eq!(second.id, "Q-2");
        assert_eq!(
            second.embedding_text,
            "Question: Which size?\nCorrect Answer: 14 Fr\nLearning Objective: Pick a size\n\
             All Options: 12 Fr | 14 Fr\nCompetency: Catheter Care (Knowledge)"
        );
        assert_eq!(second.metadata["correct_option_text"], MetadataValue::from("14 Fr"));
        assert_eq!(second.metadata["competency_id"], MetadataValue::from("C-1"));
    }

    #[test]
    fn renders_checklist_steps_in_order() {
        let bundle = Normalizer::new(NormalizationConfig::default())
            .normalize(&sample())
            .expect("normalize")
            .bundle;
        let checklist = &bundle.checklists[0];

        assert_eq!(
            checklist.embedding_text,
            "Procedural Checklist: Insert a catheter\nCompetency: Procedural Skills (Skill)\n\
             Correct sequence (2 steps):\n1. Wash hands\n2. Explain procedure"
        );
        assert_eq!(checklist.metadata["total_steps"], MetadataValue::Int(2));
        assert_eq!(
            checklist.metadata["steps"],
            MetadataValue::from(
                r#"[{"step_number": 1, "step_text": "Wash hands"}, {"step_number": 2, "step_text": "Explain procedure"}]"#
            )
        );
        assert_eq!(checklist.metadata["question_id"], MetadataValue::from("77"));
    }

    #[test]
    fn numeric_ids_and_list_encodings_match_json_dumps() {
        let bundle = Normalizer::new(NormalizationConfig::default())
            .normalize(&export(
                r#"{
                    "key_module_field": {"course_id": 341, "competency_name": "M", "module_domain": "D"},
                    "question_type_mcq": [{
                        "competency": {
                            "competency_id": 12,
                            "competency_type": "Knowledge",
                            "module_compentency_area": "A",
                            "module_competency_definition": "def"
                        },
                        "question": {
                            "question_ids": "'Q-1', 'Q-é'",
                            "question_texts": "'a', 'b'",
                            "correct_options_texts": "'a', 'b'",
                            "question_id_competency_definition": "'o', 'p'",
                            "options_texts": "'x', 'y'"
                        }
                    }],
                    "question_type_checklist": [{
                        "question": {"question_id": 5, "question_text": "Wash"},
                        "option": [{"option_sequence": 1, "option_text": "Soap → rinse"}]
                    }]
                }"#,
            ))
            .expect("normalize")
            .bundle;

        let competency = &bundle.competencies[0];
        assert_eq!(competency.id, "12");
        assert_eq!(competency.metadata["competency_id"], MetadataValue::Int(12));
        assert_eq!(competency.metadata["course_id"], MetadataValue::Int(341));
        assert_eq!(
            competency.metadata["question_ids"],
            MetadataValue::from(r#"["Q-1", "Q-\u00e9"]"#)
        );
        assert_eq!(bundle.mcqs[0].metadata["competency_id"], MetadataValue::Int(12));

        let checklist = &bundle.checklists[0];
        assert_eq!(checklist.metadata["question_id"], MetadataValue::from("5"));
        assert_eq!(checklist.metadata["course_id"], MetadataValue::Int(341));
        assert_eq!(
            checklist.metadata["steps"],
            MetadataValue::from(r#"[{"step_number": 1, "step_text": "Soap \u2192 rinse"}]"#)
        );
    }

    #[test]
    fn escapes_astral_characters_as_surrogate_pairs() {
        assert_eq!(encode_json(&["a😀"]), r#"["a\ud83d\ude00"]"#);
        assert_eq!(encode_json(&Vec::<String>::new()), "[]");
    }

    #[test]
    fn over_budget_competency_and_question_text_are_cut_and_flagged() {
        let long_definition = "d".repeat(300);
        let long_question = "q".repeat(300);
        let json = format!(
            r#"{{
                "key_module_field": {{"course_id": 1, "competency_name": "M", "module_domain": "D"}},
                "question_type_mcq": [{{
                    "competency": {{
                        "competency_id": "C-2",
                        "competency_type": "Knowledge",
                        "module_compentency_area": "A",
                        "module_competency_definition": "{long_definition}"
                    }},
                    "question": {{
                        "question_ids": "'Q-9'",
                        "question_texts": "'{long_question}'",
                        "correct_options_texts": "'a'",
                        "question_id_competency_definition": "'o'",
                        "options_texts": "'x'"
                    }}
                }}]
            }}"#
        );
        let config = NormalizationConfig {
            max_chars: 200,
            ..NormalizationConfig::default()
        };
        let normalized = Normalizer::new(config)
            .normalize(&export(&json))
            .expect("normalize");
        let bundle = &normalized.bundle;

        assert_eq!(char_len(&bundle.competencies[0].embedding_text), 200);
        assert_eq!(char_len(&bundle.mcqs[0].embedding_text), 200);
        assert_eq!(
            bundle.competencies[0].metadata["module_competency_definition"],
            MetadataValue::from(long_definition.as_str())
        );
        assert_eq!(
            bundle.mcqs[0].metadata["question_text"],
            MetadataValue::from(long_question.as_str())
        );
        assert!(bundle.checklists.is_empty());
        assert!(matches!(
            normalized.warnings.as_slice(),
            [
                PipelineWarning::Truncated {
                    kind: RecordKind::Competency,
                    id: competency_id,
                    max_chars: 200,
                    ..
                },
                PipelineWarning::Truncated {
                    kind: RecordKind::Mcq,
                    id: question_id,
                    max_chars: 200,
                    ..
                }
            ] if competency_id == "C-2" && question_id == "Q-9"
        ));
    }

    #[test]
    fn caps_listed_objectives_but_keeps_all_question_ids() {
        let ids: Vec<String> = (1..=12).map(|i| format!("'Q-{i}'")).collect();
        let objectives: Vec<String> = (1..=12).map(|i| format!("'obj {i}'")).collect();
        let filler = vec!["'x'"; 12].join(", ");
        let json = format!(
            r#"{{
                "key_module_field": {{"course_id": 1, "competency_name": "M", "module_domain": "D"}},
                "question_type_mcq": [{{
                    "competency": {{
                        "competency_id": "C",
                        "competency_type": "Knowledge",
                        "module_compentency_area": "A",
                        "module_competency_definition": "def"
                    }},
                    "question": {{
                        "question_ids": "{ids}",
                        "question_texts": "{filler}",
                        "correct_options_texts": "{filler}",
                        "question_id_competency_definition": "{objectives}",
                        "options_texts": "{filler}"
                    }}
                }}]
            }}"#,
            ids = ids.join(", "),
            objectives = objectives.join(", "),
        );
        let bundle = Normalizer::new(NormalizationConfig::default())
            .normalize(&export(&json))
            .expect("normalize")
            .bundle;
        let competency = &bundle.competencies[0];

        assert!(competency.embedding_text.contains("- obj 10\n"));
        assert!(!competency.embedding_text.contains("obj 11"));
        assert_eq!(competency.metadata["question_count"], MetadataValue::Int(12));
        assert_eq!(bundle.mcqs.len(), 12);
        assert!(bundle.checklists.is_empty());
    }

    #[test]
    fn unequal_question_lists_are_rejected() {
        let export = export(
            r#"{
                "key_module_field": {"course_id": 1, "competency_name": "M", "module_domain": "D"},
                "question_type_mcq": [{
                    "competency": {
                        "competency_id": "C-9",
                        "competency_type": "Knowledge",
                        "module_compentency_area": "A",
                        "module_competency_definition": "def"
                    },
                    "question": {
                        "question_ids": "'Q-1', 'Q-2'",
                        "question_texts": "'only one'",
                        "correct_options_texts": "'a', 'b'",
                        "question_id_competency_definition": "'o', 'p'",
                        "options_texts": "'x', 'y'"
                    }
                }]
            }"#,
        );
        let err = Normalizer::new(NormalizationConfig::default())
            .normalize(&export)
            .expect_err("length mismatch rejected");
        match err {
            NormalizeError::Malformed(inner) => {
                assert!(inner.reason().contains("C-9"), "{inner}");
                assert!(inner.reason().contains("question_texts=1"), "{inner}");
            }
            other => panic!("expected malformed input, got {other:?}"),
        }
    }

    #[test]
    fn long_checklist_compresses_then_truncates() {
        let steps: Vec<String> = (1..=60)
            .map(|i| format!(r#"{{"option_sequence": {i}, "option_text": "{}"}}"#, "step ".repeat(10)))
            .collect();
        let json = format!(
            r#"{{
                "key_module_field": {{"course_id": 1, "competency_name": "M", "module_domain": "D"}},
                "question_type_checklist": [{{
                    "question": {{"question_id": "K-1", "question_text": "Long procedure"}},
                    "option": [{}]
                }}]
            }}"#,
            steps.join(",")
        );
        let normalized = Normalizer::new(NormalizationConfig::default())
            .normalize(&export(&json))
            .expect("normalize");
        let checklist = &normalized.bundle.checklists[0];

        assert!(checklist.embedding_text.starts_with("Long procedure\nSteps:\n1. step"));
        assert_eq!(char_len(&checklist.embedding_text), 2048);
        assert_eq!(checklist.metadata["total_steps"], MetadataValue::Int(60));
        assert!(matches!(
            normalized.warnings.as_slice(),
            [
                PipelineWarning::ChecklistCompressed { .. },
                PipelineWarning::Truncated { kind: RecordKind::Checklist, .. }
            ]
        ));
    }

    #[test]
    fn duplicate_ids_are_kept_and_flagged() {
        let export = export(
            r#"{
                "key_module_field": {"course_id": 1, "competency_name": "M", "module_domain": "D"},
                "question_type_mcq": [{
                    "competency": {
                        "competency_id": "X-1",
                        "competency_type": "Knowledge",
                        "module_compentency_area": "A",
                        "module_competency_definition": "def"
                    },
                    "question": {
                        "question_ids": "'X-1'",
                        "question_texts": "'q'",
                        "correct_options_texts": "'a'",
                        "question_id_competency_definition": "'o'",
                        "options_texts": "'x'"
                    }
                }]
            }"#,
        );
        let normalized = Normalizer::new(NormalizationConfig::default())
            .normalize(&export)
            .expect("normalize");

        assert_eq!(normalized.bundle.total_vectors, 2);
        assert_eq!(
            normalized.warnings,
            vec![PipelineWarning::DuplicateId {
                id: "X-1".into(),
                kind: RecordKind::Mcq
            }]
        );
    }
}
