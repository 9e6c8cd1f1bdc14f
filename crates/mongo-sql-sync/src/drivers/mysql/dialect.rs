//! MySQL SQL dialect (Strategy pattern).

use crate::core::traits::Dialect;
use crate::typemap::SqlType;

/// MySQL dialect implementation.
///
/// Compatible with MySQL 5.7+ and 8.0+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn display_name(&self) -> &str {
        "MySQL"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain backticks by doubling them
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn render_type(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Identifier(n) | SqlType::VarChar(n) => format!("VARCHAR({})", n),
            SqlType::Text => "LONGTEXT".to_string(),
            SqlType::Int => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "DATETIME".to_string(),
        }
    }

    fn identity_keyword(&self) -> &str {
        "AUTO_INCREMENT"
    }

    fn build_drop_table(&self, schema: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualify(schema, table))
    }

    fn create_table_suffix(&self) -> &str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
    }

    fn build_upsert(&self, schema: &str, table: &str, columns: &[String], key: &str) -> String {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(key))
            .map(|c| {
                let q = self.quote_ident(c);
                format!("{} = VALUES({})", q, q)
            })
            .collect();
        let update_clause = if updates.is_empty() {
            // Key-only rows still need a no-op assignment
            let q = self.quote_ident(key);
            format!("{} = {}", q, q)
        } else {
            updates.join(", ")
        };
        format!(
            "{} ON DUPLICATE KEY UPDATE {}",
            self.build_insert(schema, table, columns),
            update_clause
        )
    }

    fn table_exists_query(&self) -> String {
        "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
            .to_string()
    }

    fn column_names_query(&self) -> String {
        "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_ident() {
        let d = MysqlDialect::new();
        assert_eq!(d.quote_ident("users"), "`users`");
        assert_eq!(d.quote_ident("table`name"), "`table``name`");
    }

    #[test]
    fn test_build_insert_and_upsert() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.build_insert("shop", "users", &cols(&["_id", "name"])),
            "INSERT INTO `shop`.`users` (`_id`, `name`) VALUES (?, ?)"
        );
        assert_eq!(
            d.build_upsert("shop", "users", &cols(&["_id", "name"]), "_id"),
            "INSERT INTO `shop`.`users` (`_id`, `name`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
        assert!(d
            .build_upsert("shop", "users", &cols(&["_id"]), "_id")
            .ends_with("ON DUPLICATE KEY UPDATE `_id` = `_id`"));
    }

    #[test]
    fn test_build_update_excludes_key() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.build_update("shop", "users", &cols(&["_id", "name", "age"]), "_id"),
            "UPDATE `shop`.`users` SET `name` = ?, `age` = ? WHERE `_id` = ?"
        );
    }

    #[test]
    fn test_build_update_key_only_table() {
        let d = MysqlDialect::new();
        assert_eq!(
            d.build_update("", "users", &cols(&["_id"]), "_id"),
            "UPDATE `users` SET `_id` = `_id` WHERE `_id` = ?"
        );
    }

    #[test]
    fn test_add_column_is_nullable() {
        let d = MysqlDialect::new();
        let col = ColumnDefinition::data("nickname", SqlType::VarChar(255), "nickname");
        assert_eq!(
            d.build_add_column("shop", "users", &col),
            "ALTER TABLE `shop`.`users` ADD `nickname` VARCHAR(255) NULL"
        );
    }

    #[test]
    fn test_render_types() {
        let d = MysqlDialect::new();
        assert_eq!(d.render_type(SqlType::Boolean), "BOOLEAN");
        assert_eq!(d.render_type(SqlType::Timestamp), "DATETIME");
        assert_eq!(d.render_type(SqlType::Identifier(64)), "VARCHAR(64)");
        assert_eq!(d.build_drop_table("", "t"), "DROP TABLE IF EXISTS `t`");
    }
}
