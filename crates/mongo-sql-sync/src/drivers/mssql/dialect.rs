//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides SQL Server syntax for identifier quoting, DDL rendering and
//! parameter placeholders.

use crate::core::traits::Dialect;
use crate::typemap::SqlType;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn display_name(&self) -> &str {
        "SQL Server"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain closing brackets by doubling them
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        // MSSQL uses @P1, @P2, etc. (1-based)
        format!("@P{}", index)
    }

    fn render_type(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Identifier(n) | SqlType::VarChar(n) => format!("NVARCHAR({})", n),
            SqlType::Text => "NVARCHAR(MAX)".to_string(),
            SqlType::Int => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
            SqlType::Boolean => "BIT".to_string(),
            SqlType::Timestamp => "DATETIME2".to_string(),
        }
    }

    fn identity_keyword(&self) -> &str {
        "IDENTITY(1,1)"
    }

    fn build_drop_table(&self, schema: &str, table: &str) -> String {
        let qualified = self.qualify(schema, table);
        format!(
            "IF OBJECT_ID(N'{}', N'U') IS NOT NULL DROP TABLE {}",
            qualified.replace('\'', "''"),
            qualified
        )
    }

    fn build_upsert(&self, schema: &str, table: &str, columns: &[String], key: &str) -> String {
        let source_cols: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} AS {}", self.param_placeholder(i + 1), self.quote_ident(c)))
            .collect();

        let update_set: Vec<String> = columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(key))
            .map(|c| {
                let q = self.quote_ident(c);
                format!("t.{} = s.{}", q, q)
            })
            .collect();

        let insert_vals: Vec<String> = columns
            .iter()
            .map(|c| format!("s.{}", self.quote_ident(c)))
            .collect();

        let quoted_key = self.quote_ident(key);
        let mut sql = format!(
            "MERGE {} AS t USING (SELECT {}) AS s ON t.{} = s.{}",
            self.qualify(schema, table),
            source_cols.join(", "),
            quoted_key,
            quoted_key
        );

        // WHEN MATCHED - UPDATE (only if there are non-key columns)
        if !update_set.is_empty() {
            sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", update_set.join(", ")));
        }

        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            self.column_list(columns),
            insert_vals.join(", ")
        ));

        // MSSQL MERGE requires semicolon terminator
        sql.push(';');

        sql
    }

    fn table_exists_query(&self) -> String {
        "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2"
            .to_string()
    }

    fn column_names_query(&self) -> String {
        "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 ORDER BY ORDINAL_POSITION"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_ident() {
        let d = MssqlDialect::new();
        assert_eq!(d.quote_ident("users"), "[users]");
        assert_eq!(d.quote_ident("table]name"), "[table]]name]");
        assert_eq!(d.param_placeholder(3), "@P3");
    }

    #[test]
    fn test_build_update_numbering() {
        let d = MssqlDialect::new();
        assert_eq!(
            d.build_update("dbo", "users", &cols(&["_id", "name", "age"]), "_id"),
            "UPDATE [dbo].[users] SET [name] = @P1, [age] = @P2 WHERE [_id] = @P3"
        );
        assert_eq!(
            d.build_update("dbo", "users", &cols(&["_id"]), "_id"),
            "UPDATE [dbo].[users] SET [_id] = [_id] WHERE [_id] = @P1"
        );
    }

    #[test]
    fn test_build_upsert_merge() {
        let d = MssqlDialect::new();
        let sql = d.build_upsert("dbo", "users", &cols(&["_id", "name"]), "_id");
        assert_eq!(
            sql,
            "MERGE [dbo].[users] AS t USING (SELECT @P1 AS [_id], @P2 AS [name]) AS s \
             ON t.[_id] = s.[_id] WHEN MATCHED THEN UPDATE SET t.[name] = s.[name] \
             WHEN NOT MATCHED THEN INSERT ([_id], [name]) VALUES (s.[_id], s.[name]);"
        );
    }

    #[test]
    fn test_drop_table_is_existence_checked() {
        let d = MssqlDialect::new();
        assert_eq!(
            d.build_drop_table("dbo", "users"),
            "IF OBJECT_ID(N'[dbo].[users]', N'U') IS NOT NULL DROP TABLE [dbo].[users]"
        );
    }

    #[test]
    fn test_render_types() {
        let d = MssqlDialect::new();
        assert_eq!(d.render_type(SqlType::Boolean), "BIT");
        assert_eq!(d.render_type(SqlType::Text), "NVARCHAR(MAX)");
        assert_eq!(d.render_type(SqlType::Timestamp), "DATETIME2");
    }
}
