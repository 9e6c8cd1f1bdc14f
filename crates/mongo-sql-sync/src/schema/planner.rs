//! Relational schema planning.
//!
//! Partitions an [`InferredSchema`] by path shape into a main table, one child
//! table per nested-object root and one junction table per single-level array.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::inference::{FieldSchema, InferredSchema, ARRAY_MARKER};
use crate::core::identifier::{child_table_name, column_name};
use crate::typemap::{map_element, map_field, SqlType, TypeOptions};

/// Surrogate key column of child and junction tables.
pub const SURROGATE_KEY: &str = "id";
/// Element position column of junction tables.
pub const ARRAY_INDEX_COLUMN: &str = "array_index";
/// Element value column of primitive junction tables.
pub const VALUE_COLUMN: &str = "value";
/// Prefix applied to document fields whose names collide with synthetic columns.
const COLLISION_PREFIX: &str = "doc_";

/// How a table relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RelationshipKind {
    None,
    NestedObject,
    ArrayOfObject,
    ArrayOfPrimitive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    /// Document path, relative to the table's source, this column is filled from.
    pub source_field: Option<String>,
}

impl ColumnDefinition {
    /// A nullable data column filled from `source_field`.
    pub fn data(name: impl Into<String>, sql_type: SqlType, source_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            is_primary_key: false,
            is_identity: false,
            source_field: Some(source_field.into()),
        }
    }

    fn synthetic(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable: false,
            is_primary_key: false,
            is_identity: false,
            source_field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub parent_table: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub foreign_key_column: Option<String>,
    /// Column of the parent table the foreign key references.
    pub parent_key_column: Option<String>,
    pub relationship_kind: RelationshipKind,
    /// Document path the table was derived from (`None` for the main table).
    pub source_path: Option<String>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    /// Columns written by the loader (everything except identity columns).
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.is_identity)
    }
}

/// Output of the planner for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaPlan {
    pub collection: String,
    pub key_field: String,
    pub key_column: String,
    /// Main table first, then child and junction tables.
    pub tables: Vec<TableDefinition>,
    pub warnings: Vec<String>,
}

impl SchemaPlan {
    pub fn main_table(&self) -> &TableDefinition {
        &self.tables[0]
    }

    pub fn child_tables(&self) -> &[TableDefinition] {
        &self.tables[1..]
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub key_field: String,
    pub types: TypeOptions,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            key_field: "_id".to_string(),
            types: TypeOptions::default(),
        }
    }
}

/// Plan tables for `collection` from an inferred schema.
pub fn plan_tables(collection: &str, schema: &InferredSchema, opts: &PlanOptions) -> SchemaPlan {
    let main_name = column_name(collection);
    let key_column = column_name(&opts.key_field);
    let fk_column = format!("{}_id", main_name);
    let id_type = SqlType::Identifier(opts.types.id_length);
    let mut warnings = Vec::new();

    // Main table
    let mut main_columns = vec![ColumnDefinition {
        name: key_column.clone(),
        sql_type: id_type,
        nullable: false,
        is_primary_key: true,
        is_identity: false,
        source_field: Some(opts.key_field.clone()),
    }];
    for field in schema.fields.iter().filter(|f| is_flat(f)) {
        if field.path == opts.key_field {
            continue;
        }
        push_column(
            &mut main_columns,
            ColumnDefinition {
                name: column_name(&field.path),
                sql_type: map_field(field, &opts.types),
                nullable: !field.is_required(schema.total_docs),
                is_primary_key: false,
                is_identity: false,
                source_field: Some(field.path.clone()),
            },
            &main_name,
            &mut warnings,
        );
    }
    if schema.get(&opts.key_field).is_none() && schema.total_docs > 0 {
        warnings.push(format!(
            "key field '{}' was not observed in the sample",
            opts.key_field
        ));
    }

    let mut tables = vec![TableDefinition {
        name: main_name.clone(),
        parent_table: None,
        columns: main_columns,
        foreign_key_column: None,
        parent_key_column: None,
        relationship_kind: RelationshipKind::None,
        source_path: None,
    }];

    let child_prefix = |kind: RelationshipKind| {
        let mut cols = vec![
            ColumnDefinition {
                is_primary_key: true,
                is_identity: true,
                ..ColumnDefinition::synthetic(SURROGATE_KEY, SqlType::Int)
            },
            ColumnDefinition::synthetic(&fk_column, id_type),
        ];
        if kind != RelationshipKind::NestedObject {
            cols.push(ColumnDefinition::synthetic(ARRAY_INDEX_COLUMN, SqlType::Int));
        }
        cols
    };

    // Walk entries in first-seen order so table order follows the documents.
    let mut seen_roots = HashSet::new();
    for field in &schema.fields {
        if let Some(root) = nested_root(field) {
            if !seen_roots.insert(root.to_string()) {
                continue;
            }
            let table_name = unique_table_name(&main_name, root, &tables, &mut warnings);
            let synthetic = [SURROGATE_KEY, fk_column.as_str()];
            let mut columns = child_prefix(RelationshipKind::NestedObject);
            let prefix = format!("{}.", root);
            for desc in schema.fields.iter().filter(|f| {
                f.path.starts_with(&prefix)
                    && !f.path.contains(ARRAY_MARKER)
                    && !f.is_nested
                    && !f.is_array
            }) {
                let relative = &desc.path[prefix.len()..];
                let column = ColumnDefinition::data(
                    avoid_synthetic(column_name(relative), &synthetic),
                    map_field(desc, &opts.types),
                    relative,
                );
                push_column(&mut columns, column, &table_name, &mut warnings);
            }
            if columns.len() == 2 {
                debug!("Nested object '{}' has no scalar fields, no table planned", root);
                continue;
            }
            tables.push(child_table(
                table_name,
                &main_name,
                &fk_column,
                &key_column,
                RelationshipKind::NestedObject,
                root,
                columns,
            ));
        } else if is_array_group(field) {
            let table_name = unique_table_name(&main_name, &field.path, &tables, &mut warnings);
            let kind = if field.has_object_elements() {
                RelationshipKind::ArrayOfObject
            } else {
                RelationshipKind::ArrayOfPrimitive
            };
            let mut columns = child_prefix(kind);

            if kind == RelationshipKind::ArrayOfObject {
                let with_value = field.has_primitive_elements();
                let mut synthetic = vec![SURROGATE_KEY, fk_column.as_str(), ARRAY_INDEX_COLUMN];
                if with_value {
                    synthetic.push(VALUE_COLUMN);
                }
                let prefix = format!("{}.", field.path);
                for sub in schema.fields.iter().filter(|f| f.path.starts_with(&prefix)) {
                    let relative = &sub.path[prefix.len()..];
                    if relative.contains('.') {
                        continue;
                    }
                    let (name, sql_type) = if relative.ends_with(ARRAY_MARKER) || sub.is_nested {
                        (relative.trim_end_matches(ARRAY_MARKER), SqlType::Text)
                    } else {
                        (relative, map_field(sub, &opts.types))
                    };
                    let column = ColumnDefinition::data(
                        avoid_synthetic(column_name(name), &synthetic),
                        sql_type,
                        name,
                    );
                    push_column(&mut columns, column, &table_name, &mut warnings);
                }
                if with_value {
                    columns.push(ColumnDefinition::data(
                        VALUE_COLUMN,
                        SqlType::Text,
                        VALUE_COLUMN,
                    ));
                }
            } else {
                columns.push(ColumnDefinition::data(
                    VALUE_COLUMN,
                    map_element(field, &opts.types),
                    VALUE_COLUMN,
                ));
            }

            let source = field.path.trim_end_matches(ARRAY_MARKER);
            tables.push(child_table(
                table_name,
                &main_name,
                &fk_column,
                &key_column,
                kind,
                source,
                columns,
            ));
        }
    }

    for w in &warnings {
        warn!("Schema plan for {}: {}", collection, w);
    }

    SchemaPlan {
        collection: collection.to_string(),
        key_field: opts.key_field.clone(),
        key_column,
        tables,
        warnings,
    }
}

fn child_table(
    name: String,
    main: &str,
    fk: &str,
    key: &str,
    kind: RelationshipKind,
    source: &str,
    columns: Vec<ColumnDefinition>,
) -> TableDefinition {
    TableDefinition {
        name,
        parent_table: Some(main.to_string()),
        columns,
        foreign_key_column: Some(fk.to_string()),
        parent_key_column: Some(key.to_string()),
        relationship_kind: kind,
        source_path: Some(source.to_string()),
    }
}

/// Top-level scalar field: becomes a main table column.
pub fn is_flat(field: &FieldSchema) -> bool {
    !field.path.contains('.')
        && !field.path.contains(ARRAY_MARKER)
        && !field.is_nested
        && !field.is_array
}

/// Root segment of a nested-object descendant path.
fn nested_root(field: &FieldSchema) -> Option<&str> {
    if field.path.contains(ARRAY_MARKER) {
        return None;
    }
    field.path.split_once('.').map(|(root, _)| root)
}

/// Array path with exactly one marker, at its end.
fn is_array_group(field: &FieldSchema) -> bool {
    field.path.ends_with(ARRAY_MARKER) && field.path.matches(ARRAY_MARKER).count() == 1
}

/// Child table name for `path`, `doc_`-prefixed until no planned table uses it.
///
/// A field holding an object in some documents and an array in others
/// yields two tables from the same path.
fn unique_table_name(
    main: &str,
    path: &str,
    tables: &[TableDefinition],
    warnings: &mut Vec<String>,
) -> String {
    let taken = |name: &str| tables.iter().any(|t| t.name.eq_ignore_ascii_case(name));
    let name = child_table_name(main, path);
    if !taken(&name) {
        return name;
    }
    let mut relative = path.to_string();
    let mut candidate = name.clone();
    while taken(&candidate) {
        relative = format!("{}{}", COLLISION_PREFIX, relative);
        candidate = child_table_name(main, &relative);
    }
    warnings.push(format!(
        "table '{}' already planned, field '{}' uses table '{}'",
        name, path, candidate
    ));
    candidate
}

fn avoid_synthetic(name: String, synthetic: &[&str]) -> String {
    if synthetic.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
        format!("{}{}", COLLISION_PREFIX, name)
    } else {
        name
    }
}

fn push_column(
    columns: &mut Vec<ColumnDefinition>,
    column: ColumnDefinition,
    table: &str,
    warnings: &mut Vec<String>,
) {
    if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
        warnings.push(format!(
            "column '{}' in table '{}' already planned, field '{}' skipped",
            column.name,
            table,
            column.source_field.as_deref().unwrap_or_default()
        ));
        return;
    }
    columns.push(column);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Document;
    use crate::schema::SchemaInferencer;
    use serde_json::json;

    fn plan(values: Vec<serde_json::Value>) -> SchemaPlan {
        let docs: Vec<Document> = values.into_iter().map(Document::from_json).collect();
        let schema = SchemaInferencer::default().infer(&docs);
        plan_tables("users", &schema, &PlanOptions::default())
    }

    #[test]
    fn test_main_table_nullability() {
        let plan = plan(vec![
            json!({"_id": "1", "name": "A", "age": 30}),
            json!({"_id": "2", "name": "B", "age": 25}),
            json!({"_id": "3", "name": "C"}),
        ]);
        let main = plan.main_table();
        assert_eq!(main.name, "users");
        let id = main.column("_id").unwrap();
        assert!(id.is_primary_key && !id.nullable);
        assert_eq!(id.sql_type, SqlType::Identifier(64));
        assert!(!main.column("name").unwrap().nullable);
        let age = main.column("age").unwrap();
        assert!(age.nullable);
        assert_eq!(age.sql_type, SqlType::Int);
        assert_eq!(plan.tables.len(), 1);
    }

    #[test]
    fn test_primitive_array_junction() {
        let plan = plan(vec![json!({"_id": "1", "tags": ["a", "b"]})]);
        assert!(plan.main_table().column("tags").is_none());
        let tags = plan.table("users_tags").unwrap();
        assert_eq!(tags.relationship_kind, RelationshipKind::ArrayOfPrimitive);
        assert_eq!(tags.parent_table.as_deref(), Some("users"));
        assert_eq!(tags.foreign_key_column.as_deref(), Some("users_id"));
        let names: Vec<&str> = tags.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "users_id", "array_index", "value"]);
        assert!(tags.columns[0].is_identity);
        assert_eq!(tags.column("value").unwrap().sql_type, SqlType::VarChar(255));
    }

    #[test]
    fn test_object_array_junction() {
        let plan = plan(vec![json!({
            "_id": "1",
            "items": [{"sku": "x", "qty": 2, "dims": [1, 2], "id": 9}]
        })]);
        let items = plan.table("users_items").unwrap();
        assert_eq!(items.relationship_kind, RelationshipKind::ArrayOfObject);
        assert_eq!(items.column("sku").unwrap().sql_type, SqlType::VarChar(255));
        assert_eq!(items.column("qty").unwrap().sql_type, SqlType::Int);
        assert_eq!(items.column("dims").unwrap().sql_type, SqlType::Text);
        let renamed = items.column("doc_id").unwrap();
        assert_eq!(renamed.source_field.as_deref(), Some("id"));
        assert!(items.column("value").is_none());
    }

    #[test]
    fn test_nested_object_child_table() {
        let plan = plan(vec![json!({
            "_id": "1",
            "address": {"city": "Oslo", "geo": {"lat": 59.9}}
        })]);
        let address = plan.table("users_address").unwrap();
        assert_eq!(address.relationship_kind, RelationshipKind::NestedObject);
        assert!(address.column("array_index").is_none());
        let lat = address.column("geo_lat").unwrap();
        assert_eq!(lat.source_field.as_deref(), Some("geo.lat"));
        assert_eq!(lat.sql_type, SqlType::Decimal(18, 2));
        assert_eq!(address.source_path.as_deref(), Some("address"));
    }

    #[test]
    fn test_mixed_object_array_gets_value_column() {
        let plan = plan(vec![json!({"_id": "1", "mix": [{"a": 1}, "loose"]})]);
        let mix = plan.table("users_mix").unwrap();
        assert!(mix.column("a").is_some());
        assert!(mix.column("value").is_some());
    }

    #[test]
    fn test_double_nested_arrays_are_not_tables() {
        let plan = plan(vec![json!({"_id": "1", "grid": [{"cells": [{"v": 1}]}]})]);
        assert!(plan.table("users_grid").is_some());
        assert!(plan.tables.iter().all(|t| t.name != "users_grid_cells"));
    }

    #[test]
    fn test_key_always_present() {
        let plan = plan(vec![json!({"name": "no id"})]);
        assert!(plan.main_table().column("_id").is_some());
        assert!(plan.warnings.iter().any(|w| w.contains("key field")));
    }

    #[test]
    fn test_object_and_array_under_one_field_get_distinct_tables() {
        let plan = plan(vec![
            json!({"_id": "1", "tags": {"main": "a"}}),
            json!({"_id": "2", "tags": ["x", "y"]}),
        ]);
        let nested = plan.table("users_tags").unwrap();
        assert_eq!(nested.relationship_kind, RelationshipKind::NestedObject);
        let array = plan.table("users_doc_tags").unwrap();
        assert_eq!(array.relationship_kind, RelationshipKind::ArrayOfPrimitive);
        assert_eq!(array.source_path.as_deref(), Some("tags"));
        assert!(plan.warnings.iter().any(|w| w.contains("users_doc_tags")));
    }
}
