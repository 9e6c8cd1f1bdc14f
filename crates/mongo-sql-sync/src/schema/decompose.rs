//! Decomposition of a document into child and junction table rows.

use super::planner::{RelationshipKind, TableDefinition, ARRAY_INDEX_COLUMN, VALUE_COLUMN};
use crate::core::{DocValue, Document, Row, SqlValue};

/// Rows of `table` contributed by `doc`, whose key is `parent_id`.
///
/// Returns nothing for the main table or when the document lacks the
/// structure the table was planned from.
pub fn child_rows(table: &TableDefinition, doc: &Document, parent_id: &str) -> Vec<Row> {
    let (Some(source), Some(fk)) = (&table.source_path, &table.foreign_key_column) else {
        return Vec::new();
    };

    match table.relationship_kind {
        RelationshipKind::None => Vec::new(),
        RelationshipKind::NestedObject => match doc.get(source) {
            Some(DocValue::Object(obj)) => {
                let mut row = Row::new().with(fk.as_str(), SqlValue::from(parent_id));
                for col in data_columns(table) {
                    let value = col
                        .source_field
                        .as_deref()
                        .and_then(|f| obj.get_path(f))
                        .map(SqlValue::from_doc)
                        .unwrap_or(SqlValue::Null);
                    row.push(col.name.as_str(), value);
                }
                vec![row]
            }
            _ => Vec::new(),
        },
        RelationshipKind::ArrayOfPrimitive | RelationshipKind::ArrayOfObject => {
            let Some(DocValue::Array(items)) = doc.get_path(source) else {
                return Vec::new();
            };
            let has_value = table.column(VALUE_COLUMN).is_some();
            let mut rows = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let mut row = Row::new()
                    .with(fk.as_str(), SqlValue::from(parent_id))
                    .with(ARRAY_INDEX_COLUMN, SqlValue::I64(index as i64));
                match (table.relationship_kind, item) {
                    (RelationshipKind::ArrayOfPrimitive, _) => {
                        row.push(VALUE_COLUMN, SqlValue::from_doc(item));
                    }
                    (_, DocValue::Object(obj)) => {
                        for col in data_columns(table) {
                            let value = if col.name == VALUE_COLUMN {
                                SqlValue::Null
                            } else {
                                col.source_field
                                    .as_deref()
                                    .and_then(|f| obj.get(f))
                                    .map(SqlValue::from_doc)
                                    .unwrap_or(SqlValue::Null)
                            };
                            row.push(col.name.as_str(), value);
                        }
                    }
                    (_, primitive) if has_value => {
                        for col in data_columns(table) {
                            let value = if col.name == VALUE_COLUMN && !primitive.is_null() {
                                SqlValue::Text(primitive.display_string())
                            } else {
                                SqlValue::Null
                            };
                            row.push(col.name.as_str(), value);
                        }
                    }
                    _ => continue,
                }
                rows.push(row);
            }
            rows
        }
    }
}

fn data_columns(table: &TableDefinition) -> impl Iterator<Item = &super::ColumnDefinition> {
    table.columns.iter().filter(|c| c.source_field.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{plan_tables, PlanOptions, SchemaInferencer};
    use serde_json::json;

    fn plan_for(doc: &Document) -> crate::schema::SchemaPlan {
        let schema = SchemaInferencer::default().infer(std::slice::from_ref(doc));
        plan_tables("orders", &schema, &PlanOptions::default())
    }

    #[test]
    fn test_primitive_array_rows() {
        let doc = Document::from_json(json!({"_id": "o1", "tags": ["a", "b"]}));
        let plan = plan_for(&doc);
        let rows = child_rows(plan.table("orders_tags").unwrap(), &doc, "o1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("orders_id"), Some(&SqlValue::from("o1")));
        assert_eq!(rows[1].get("array_index"), Some(&SqlValue::I64(1)));
        assert_eq!(rows[1].get("value"), Some(&SqlValue::from("b")));
    }

    #[test]
    fn test_object_array_rows() {
        let doc = Document::from_json(json!({
            "_id": "o1",
            "items": [{"sku": "x", "qty": 2}, {"sku": "y", "opts": {"gift": true}}]
        }));
        let plan = plan_for(&doc);
        let rows = child_rows(plan.table("orders_items").unwrap(), &doc, "o1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("qty"), Some(&SqlValue::I64(2)));
        assert_eq!(rows[1].get("qty"), Some(&SqlValue::Null));
        assert_eq!(rows[1].get("opts"), Some(&SqlValue::from(r#"{"gift":true}"#)));
    }

    #[test]
    fn test_nested_object_row() {
        let doc = Document::from_json(json!({
            "_id": "o1",
            "ship": {"city": "Oslo", "geo": {"zip": "0150"}}
        }));
        let plan = plan_for(&doc);
        let rows = child_rows(plan.table("orders_ship").unwrap(), &doc, "o1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("city"), Some(&SqlValue::from("Oslo")));
        assert_eq!(rows[0].get("geo_zip"), Some(&SqlValue::from("0150")));
    }

    #[test]
    fn test_missing_structure_yields_no_rows() {
        let planned = Document::from_json(json!({"_id": "o1", "tags": ["a"]}));
        let plan = plan_for(&planned);
        let other = Document::from_json(json!({"_id": "o2", "tags": "not-an-array"}));
        assert!(child_rows(plan.table("orders_tags").unwrap(), &other, "o2").is_empty());
        assert!(child_rows(plan.main_table(), &planned, "o1").is_empty());
    }
}
