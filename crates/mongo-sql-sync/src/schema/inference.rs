//! Schema inference from sampled documents.
//!
//! Every field at every nesting level gets a [`FieldSchema`] entry keyed by its
//! dotted path. Array values are keyed with a trailing `[]` marker, and fields
//! of objects found inside arrays continue under the marked path, so
//! `items: [{sku: ..}]` produces `items[]` and `items[].sku`.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{DocValue, Document, ValueType};

/// Maximum retained sample values per field.
const MAX_SAMPLES: usize = 3;

/// Maximum characters kept per sample value.
const SAMPLE_CHARS: usize = 50;

/// Marker appended to array paths.
pub const ARRAY_MARKER: &str = "[]";

/// Everything observed about one document path.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSchema {
    pub path: String,
    pub type_histogram: BTreeMap<ValueType, usize>,
    /// Number of sampled documents in which the path was present.
    pub occurrence_count: usize,
    pub is_nested: bool,
    pub is_array: bool,
    pub array_element_type_histogram: BTreeMap<ValueType, usize>,
    pub sample_values: Vec<String>,
    /// Some observed integer does not fit in 32 bits.
    pub wide_integer: bool,
    /// Longest string observed, in characters.
    pub max_string_length: usize,
    #[serde(skip)]
    last_doc: Option<usize>,
}

impl FieldSchema {
    fn new(path: String) -> Self {
        Self {
            path,
            type_histogram: BTreeMap::new(),
            occurrence_count: 0,
            is_nested: false,
            is_array: false,
            array_element_type_histogram: BTreeMap::new(),
            sample_values: Vec::new(),
            wide_integer: false,
            max_string_length: 0,
            last_doc: None,
        }
    }

    fn observe(&mut self, doc_seq: usize, tag: ValueType) {
        if self.last_doc != Some(doc_seq) {
            self.occurrence_count += 1;
            self.last_doc = Some(doc_seq);
        }
        *self.type_histogram.entry(tag).or_insert(0) += 1;
    }

    fn add_sample(&mut self, value: &DocValue) {
        if self.sample_values.len() >= MAX_SAMPLES {
            return;
        }
        let sample: String = value.display_string().chars().take(SAMPLE_CHARS).collect();
        if !self.sample_values.contains(&sample) {
            self.sample_values.push(sample);
        }
    }

    /// Number of times the path held an explicit null.
    pub fn null_count(&self) -> usize {
        self.type_histogram.get(&ValueType::Null).copied().unwrap_or(0)
    }

    /// Most frequent non-null scalar tag, ties broken by [`ValueType`] order.
    pub fn dominant_scalar_type(&self) -> Option<ValueType> {
        majority(&self.type_histogram)
    }

    /// Most frequent non-null scalar element tag of an array field.
    pub fn dominant_element_type(&self) -> Option<ValueType> {
        majority(&self.array_element_type_histogram)
    }

    /// Whether array elements were observed as objects.
    pub fn has_object_elements(&self) -> bool {
        self.array_element_type_histogram.contains_key(&ValueType::Object)
    }

    /// Whether array elements were observed as non-object values.
    pub fn has_primitive_elements(&self) -> bool {
        self.array_element_type_histogram
            .keys()
            .any(|t| *t != ValueType::Object && *t != ValueType::Null)
    }

    /// Present in every sampled document and never null.
    pub fn is_required(&self, total_docs: usize) -> bool {
        total_docs > 0 && self.occurrence_count == total_docs && self.null_count() == 0
    }
}

fn majority(histogram: &BTreeMap<ValueType, usize>) -> Option<ValueType> {
    // BTreeMap iterates in tie-break order, so the first maximum wins.
    let mut best: Option<(ValueType, usize)> = None;
    for (tag, count) in histogram {
        if !tag.is_scalar() || *tag == ValueType::Null {
            continue;
        }
        match best {
            Some((_, c)) if c >= *count => {}
            _ => best = Some((*tag, *count)),
        }
    }
    best.map(|(t, _)| t)
}

/// A non-fatal problem found while sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceWarning {
    pub path: String,
    pub message: String,
}

/// Result of inference over a sample.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferredSchema {
    /// Entries in first-seen order.
    pub fields: Vec<FieldSchema>,
    pub total_docs: usize,
    pub warnings: Vec<InferenceWarning>,
}

impl InferredSchema {
    pub fn get(&self, path: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.path == path)
    }
}

/// Walks sampled documents and builds an [`InferredSchema`].
#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    max_depth: usize,
}

impl SchemaInferencer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn infer(&self, docs: &[Document]) -> InferredSchema {
        let mut walk = Walk {
            fields: Vec::new(),
            index: HashMap::new(),
            warnings: Vec::new(),
            max_depth: self.max_depth,
        };

        for (seq, doc) in docs.iter().enumerate() {
            walk.visit_document(seq, doc, None, 1);
        }

        for field in &walk.fields {
            let nulls = field.null_count();
            if nulls > 0 {
                warn!("Field '{}' was null in {} sampled value(s)", field.path, nulls);
                walk.warnings.push(InferenceWarning {
                    path: field.path.clone(),
                    message: format!("null in {} sampled value(s)", nulls),
                });
            }
        }

        debug!(
            "Inferred {} field paths from {} documents",
            walk.fields.len(),
            docs.len()
        );

        InferredSchema {
            fields: walk.fields,
            total_docs: docs.len(),
            warnings: walk.warnings,
        }
    }
}

impl Default for SchemaInferencer {
    fn default() -> Self {
        Self::new(32)
    }
}

struct Walk {
    fields: Vec<FieldSchema>,
    index: HashMap<String, usize>,
    warnings: Vec<InferenceWarning>,
    max_depth: usize,
}

impl Walk {
    fn entry(&mut self, path: &str) -> &mut FieldSchema {
        let idx = match self.index.get(path) {
            Some(idx) => *idx,
            None => {
                self.fields.push(FieldSchema::new(path.to_string()));
                self.index.insert(path.to_string(), self.fields.len() - 1);
                self.fields.len() - 1
            }
        };
        &mut self.fields[idx]
    }

    fn warn(&mut self, path: &str, message: String) {
        warn!("Schema inference: {} at '{}'", message, path);
        if !self.warnings.iter().any(|w| w.path == path && w.message == message) {
            self.warnings.push(InferenceWarning {
                path: path.to_string(),
                message,
            });
        }
    }

    fn visit_document(&mut self, seq: usize, doc: &Document, parent: Option<&str>, depth: usize) {
        if depth > self.max_depth {
            let path = parent.unwrap_or("").to_string();
            self.warn(
                &path,
                format!("nesting deeper than {} levels skipped", self.max_depth),
            );
            return;
        }

        for (name, value) in doc.iter() {
            if name.is_empty() {
                self.warn(parent.unwrap_or(""), "empty field name skipped".to_string());
                continue;
            }
            let full_path = match parent {
                Some(p) => format!("{}.{}", p, name),
                None => name.to_string(),
            };
            self.visit_value(seq, full_path, value, depth);
        }
    }

    fn visit_value(&mut self, seq: usize, path: String, value: &DocValue, depth: usize) {
        match value {
            DocValue::Array(items) => {
                let array_path = format!("{}{}", path, ARRAY_MARKER);
                {
                    let entry = self.entry(&array_path);
                    entry.observe(seq, ValueType::Array);
                    entry.is_array = true;
                    for item in items {
                        *entry
                            .array_element_type_histogram
                            .entry(item.value_type())
                            .or_insert(0) += 1;
                        match item {
                            DocValue::Object(_) => entry.is_nested = true,
                            DocValue::Integer(i) if i32::try_from(*i).is_err() => {
                                entry.wide_integer = true
                            }
                            DocValue::String(s) => {
                                entry.max_string_length =
                                    entry.max_string_length.max(s.chars().count())
                            }
                            _ => {}
                        }
                    }
                }
                for item in items {
                    if let DocValue::Object(inner) = item {
                        self.visit_document(seq, inner, Some(&array_path), depth + 1);
                    }
                }
            }
            DocValue::Object(inner) => {
                {
                    let entry = self.entry(&path);
                    entry.observe(seq, ValueType::Object);
                    entry.is_nested = true;
                }
                self.visit_document(seq, inner, Some(&path), depth + 1);
            }
            DocValue::Number(f) if !f.is_finite() => {
                self.warn(&path, format!("non-finite number {} skipped", f));
            }
            DocValue::Null => {
                self.entry(&path).observe(seq, ValueType::Null);
            }
            scalar => {
                let entry = self.entry(&path);
                entry.observe(seq, scalar.value_type());
                match scalar {
                    DocValue::Integer(i) if i32::try_from(*i).is_err() => {
                        entry.wide_integer = true;
                    }
                    DocValue::String(s) => {
                        entry.max_string_length = entry.max_string_length.max(s.chars().count());
                    }
                    _ => {}
                }
                entry.add_sample(scalar);
            }
        }
    }
}
