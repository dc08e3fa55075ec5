//! SQL statement builder
//!
//! Pure text generation over the load metadata. Every identifier goes
//! through [`quote_identifier`] and every literal through [`quote_literal`];
//! nothing else is interpolated.

use std::path::Path;

use crate::database::DatabaseConfig;
use crate::database::quote::{quote_identifier, quote_identifier_list, quote_literal};
use crate::models::{Column, TableLoadSpec};

/// CSV options shared by internal-stage `COPY INTO`
fn internal_copy_csv_options() -> String {
    [
        "SKIP_HEADER = 1".to_string(),
        format!("FIELD_DELIMITER = {}", quote_literal(",")),
        format!("FIELD_OPTIONALLY_ENCLOSED_BY = {}", quote_literal("\"")),
        format!("ESCAPE_UNENCLOSED_FIELD = {}", quote_literal("\\")),
        format!("COMPRESSION = {}", quote_literal("GZIP")),
        "NULL_IF = ('')".to_string(),
    ]
    .join(" ")
}

/// Builds the statements issued against one database and schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    database: String,
    schema: String,
    warehouse: Option<String>,
}

impl QueryBuilder {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        warehouse: Option<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            warehouse,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.database, &config.schema, config.warehouse.clone())
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `"<schema>"."<table>"`
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(table))
    }

    /// Column definition: `"<db_name>" <TYPE>[(<size>)] NULL|NOT NULL [DEFAULT ...]`
    fn column_definition(item: &Column) -> String {
        let mut definition = format!(
            "{} {}",
            quote_identifier(&item.db_name),
            item.data_type.to_uppercase()
        );

        if let Some(size) = &item.size
            && item.is_sized_type()
        {
            definition.push_str(&format!("({})", size));
        }

        definition.push_str(if item.is_nullable() { " NULL" } else { " NOT NULL" });

        if let Some(default) = &item.default
            && !item.is_text()
        {
            definition.push_str(&format!(
                " DEFAULT CAST({} AS {})",
                quote_literal(default),
                item.data_type
            ));
        }

        definition
    }

    fn primary_key_definition(primary_key: &[String]) -> String {
        format!("PRIMARY KEY({})", quote_identifier_list(primary_key))
    }

    /// `CREATE [TEMPORARY ]TABLE[ IF NOT EXISTS] "<name>" (<defs>)`
    ///
    /// `IF NOT EXISTS` is only used for non-temporary tables. Ignored columns
    /// are skipped; a non-empty primary key adds a trailing `PRIMARY KEY(...)`.
    pub fn create_table(
        &self,
        name: &str,
        temporary: bool,
        items: &[Column],
        primary_key: Option<&[String]>,
    ) -> String {
        let mut definitions: Vec<String> = items
            .iter()
            .filter(|item| !item.is_ignored())
            .map(Self::column_definition)
            .collect();

        if let Some(keys) = primary_key
            && !keys.is_empty()
        {
            definitions.push(Self::primary_key_definition(keys));
        }

        format!(
            "CREATE {}TABLE{} {} ({})",
            if temporary { "TEMPORARY " } else { "" },
            if temporary { "" } else { " IF NOT EXISTS" },
            quote_identifier(name),
            definitions.join(", ")
        )
    }

    /// `DROP TABLE IF EXISTS "<name>"`
    pub fn drop_table(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(name))
    }

    /// Catalog lookup; existence means at least one row
    pub fn table_exists(&self, name: &str) -> String {
        format!(
            "SELECT * FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = {} AND TABLE_SCHEMA = {} AND TABLE_CATALOG = {}",
            quote_literal(name),
            quote_literal(&self.schema),
            quote_literal(&self.database)
        )
    }

    /// `ALTER TABLE "<schema>"."<table>" ADD PRIMARY KEY(...)`
    pub fn add_primary_key(&self, table: &str, primary_key: &[String]) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.qualified(table),
            Self::primary_key_definition(primary_key)
        )
    }

    /// `ALTER TABLE "<schema>"."<table>" ADD UNIQUE ("<column>")`
    pub fn add_unique_key(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ADD UNIQUE ({})",
            self.qualified(table),
            quote_identifier(column)
        )
    }

    /// `ALTER TABLE ... ADD FOREIGN KEY("<column>") REFERENCES ...("<ref_column>")`
    pub fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> String {
        format!(
            "ALTER TABLE {} ADD FOREIGN KEY({}) REFERENCES {}({})",
            self.qualified(table),
            quote_identifier(column),
            self.qualified(ref_table),
            quote_identifier(ref_column)
        )
    }

    /// Upload a local file to the user stage under `@~/<tmp>`
    ///
    /// Prefixed with `USE` statements because `PUT` runs in a client session
    /// that may not have selected anything yet.
    pub fn put_file(&self, path: &Path, tmp_table: &str) -> String {
        let mut statements = Vec::new();
        if let Some(warehouse) = &self.warehouse {
            statements.push(format!("USE WAREHOUSE {};", quote_identifier(warehouse)));
        }
        statements.push(format!("USE DATABASE {};", quote_identifier(&self.database)));
        statements.push(format!(
            "USE SCHEMA {}.{};",
            quote_identifier(&self.database),
            quote_identifier(&self.schema)
        ));
        statements.push(format!("PUT file://{} @~/{};", path.display(), tmp_table));
        statements.join("\n")
    }

    /// Load the file uploaded by [`put_file`](Self::put_file) into `tmp_table`
    pub fn copy_into_table(&self, tmp_table: &str, items: &[Column]) -> String {
        let columns: Vec<&str> = items
            .iter()
            .filter(|item| !item.is_ignored())
            .map(|item| item.db_name.as_str())
            .collect();

        format!(
            "COPY INTO {}({}) FROM @~/{} FILE_FORMAT = (TYPE=CSV {});",
            self.qualified(tmp_table),
            quote_identifier_list(&columns),
            tmp_table,
            internal_copy_csv_options()
        )
    }

    fn key_join(&self, spec: &TableLoadSpec, target: &str, stage: &str) -> String {
        spec.primary_key()
            .iter()
            .map(|key| {
                format!(
                    "{}.{} = {}.{}",
                    target,
                    quote_identifier(key),
                    stage,
                    quote_identifier(key)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Update target rows that share a key with the staging table
    ///
    /// Returns `None` when every loaded column is part of the key, since
    /// there is nothing to update.
    pub fn upsert_update(&self, spec: &TableLoadSpec, stage_table: &str) -> Option<String> {
        let target = self.qualified(&spec.db_name);
        let stage = self.qualified(stage_table);
        let keys = spec.primary_key();

        let assignments: Vec<String> = spec
            .active_items()
            .filter(|item| !keys.contains(&item.db_name))
            .map(|item| {
                let column = quote_identifier(&item.db_name);
                format!("{} = {}.{}", column, stage, column)
            })
            .collect();

        if assignments.is_empty() {
            return None;
        }

        Some(format!(
            "UPDATE {} SET {} FROM {} WHERE {};",
            target,
            assignments.join(", "),
            stage,
            self.key_join(spec, &target, &stage)
        ))
    }

    /// Remove staging rows already merged into the target
    pub fn upsert_delete(&self, spec: &TableLoadSpec, stage_table: &str) -> String {
        let target = self.qualified(&spec.db_name);
        let stage = self.qualified(stage_table);
        format!(
            "DELETE FROM {} USING {} WHERE {}",
            stage,
            target,
            self.key_join(spec, &target, &stage)
        )
    }

    /// Insert every remaining staging row into the target
    pub fn upsert_insert(&self, spec: &TableLoadSpec, stage_table: &str) -> String {
        let columns: Vec<&str> = spec.active_items().map(|item| item.db_name.as_str()).collect();
        let columns = quote_identifier_list(&columns);
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.qualified(&spec.db_name),
            columns,
            columns,
            self.qualified(stage_table)
        )
    }

    /// `ALTER TABLE "<a>" SWAP WITH "<b>"`
    pub fn swap_table(&self, table: &str, with: &str) -> String {
        format!(
            "ALTER TABLE {} SWAP WITH {}",
            quote_identifier(table),
            quote_identifier(with)
        )
    }

    /// Rows carry `name`, `type`, `null?`, `primary key` and `unique key`
    pub fn table_info(&self, table: &str) -> String {
        format!("DESCRIBE TABLE {}", self.qualified(table))
    }

    /// Rows carry `column_name` and a JSON `data_type`
    pub fn describe_columns(&self, table: &str) -> String {
        format!("SHOW COLUMNS IN TABLE {}", self.qualified(table))
    }

    /// `DROP STAGE IF EXISTS "<name>"`
    pub fn drop_stage(&self, name: &str) -> String {
        format!("DROP STAGE IF EXISTS {}", quote_identifier(name))
    }

    pub fn use_warehouse(&self, warehouse: &str) -> String {
        format!("USE WAREHOUSE {};", quote_identifier(warehouse))
    }

    pub fn use_schema(&self, schema: &str) -> String {
        format!("USE SCHEMA {};", quote_identifier(schema))
    }

    pub fn current_user(&self) -> String {
        "SELECT CURRENT_USER;".to_string()
    }

    pub fn describe_user(&self, user: &str) -> String {
        format!("DESC USER {};", quote_identifier(user))
    }

    pub fn test_connection(&self) -> String {
        "SELECT current_date;".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> QueryBuilder {
        QueryBuilder::new("ANALYTICS", "PUBLIC", Some("LOADING".to_string()))
    }

    fn items() -> Vec<Column> {
        vec![
            Column::new("id", "id", "int").with_nullable(false),
            Column::new("name", "name", "varchar").with_size("255"),
            Column::new("junk", "ignored", "ignore"),
        ]
    }

    #[test]
    fn test_create_table() {
        let keys = vec!["id".to_string()];
        assert_eq!(
            builder().create_table("orders", false, &items(), Some(&keys)),
            "CREATE TABLE IF NOT EXISTS \"orders\" (\"id\" INT NOT NULL, \"name\" VARCHAR(255) NULL, PRIMARY KEY(\"id\"))"
        );
    }

    #[test]
    fn test_create_temporary_table_has_no_if_not_exists() {
        let sql = builder().create_table("orders_temp", true, &items(), None);
        assert!(sql.starts_with("CREATE TEMPORARY TABLE \"orders_temp\" ("));
        assert!(!sql.contains("IF NOT EXISTS"));
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_size_only_for_sized_types() {
        let items = vec![Column::new("ts", "ts", "timestamp").with_size("9")];
        assert_eq!(
            builder().create_table("t", true, &items, None),
            "CREATE TEMPORARY TABLE \"t\" (\"ts\" TIMESTAMP NULL)"
        );
    }

    #[test]
    fn test_default_clause() {
        let items = vec![
            Column::new("n", "n", "number").with_size("10,2").with_default("0"),
            Column::new("t", "t", "TEXT").with_default("none"),
        ];
        assert_eq!(
            builder().create_table("t", true, &items, None),
            "CREATE TEMPORARY TABLE \"t\" (\"n\" NUMBER(10,2) NULL DEFAULT CAST('0' AS number), \"t\" TEXT NULL)"
        );
    }

    #[test]
    fn test_primary_key_order_preserved() {
        let items = vec![Column::new("a", "a", "int"), Column::new("b", "b", "int")];
        let keys = vec!["b".to_string(), "a".to_string()];
        let sql = builder().create_table("t", false, &items, Some(&keys));
        assert!(sql.ends_with("PRIMARY KEY(\"b\", \"a\"))"));
    }

    #[test]
    fn test_table_exists_quotes_literals() {
        assert_eq!(
            builder().table_exists("it's"),
            "SELECT * FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = 'it\\'s' AND TABLE_SCHEMA = 'PUBLIC' AND TABLE_CATALOG = 'ANALYTICS'"
        );
    }

    #[test]
    fn test_add_primary_key() {
        assert_eq!(
            builder().add_primary_key("orders", &["id".to_string(), "code".to_string()]),
            "ALTER TABLE \"PUBLIC\".\"orders\" ADD PRIMARY KEY(\"id\", \"code\")"
        );
    }

    #[test]
    fn test_add_foreign_key() {
        assert_eq!(
            builder().add_foreign_key("orders", "user_id", "users", "id"),
            "ALTER TABLE \"PUBLIC\".\"orders\" ADD FOREIGN KEY(\"user_id\") REFERENCES \"PUBLIC\".\"users\"(\"id\")"
        );
    }

    #[test]
    fn test_put_file() {
        assert_eq!(
            builder().put_file(Path::new("/data/in/tables/orders.csv"), "orders_temp"),
            "USE WAREHOUSE \"LOADING\";\nUSE DATABASE \"ANALYTICS\";\nUSE SCHEMA \"ANALYTICS\".\"PUBLIC\";\nPUT file:///data/in/tables/orders.csv @~/orders_temp;"
        );
    }

    #[test]
    fn test_copy_into_table_skips_ignored() {
        assert_eq!(
            builder().copy_into_table("orders_temp", &items()),
            "COPY INTO \"PUBLIC\".\"orders_temp\"(\"id\", \"name\") FROM @~/orders_temp FILE_FORMAT = (TYPE=CSV SKIP_HEADER = 1 FIELD_DELIMITER = ',' FIELD_OPTIONALLY_ENCLOSED_BY = '\\\"' ESCAPE_UNENCLOSED_FIELD = '\\\\' COMPRESSION = 'GZIP' NULL_IF = (''));"
        );
    }

    #[test]
    fn test_upsert_statements() {
        let spec = TableLoadSpec::new("in.c-main.orders", "orders", items(), "/data/orders.csv")
            .with_primary_key(["id"])
            .with_incremental(true);
        let builder = builder();

        assert_eq!(
            builder.upsert_update(&spec, "orders_temp").unwrap(),
            "UPDATE \"PUBLIC\".\"orders\" SET \"name\" = \"PUBLIC\".\"orders_temp\".\"name\" FROM \"PUBLIC\".\"orders_temp\" WHERE \"PUBLIC\".\"orders\".\"id\" = \"PUBLIC\".\"orders_temp\".\"id\";"
        );
        assert_eq!(
            builder.upsert_delete(&spec, "orders_temp"),
            "DELETE FROM \"PUBLIC\".\"orders_temp\" USING \"PUBLIC\".\"orders\" WHERE \"PUBLIC\".\"orders\".\"id\" = \"PUBLIC\".\"orders_temp\".\"id\""
        );
        assert_eq!(
            builder.upsert_insert(&spec, "orders_temp"),
            "INSERT INTO \"PUBLIC\".\"orders\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"PUBLIC\".\"orders_temp\""
        );
    }

    #[test]
    fn test_upsert_update_skipped_when_only_keys() {
        let spec = TableLoadSpec::new(
            "t",
            "t",
            vec![Column::new("id", "id", "int")],
            "/data/t.csv",
        )
        .with_primary_key(["id"]);
        assert!(builder().upsert_update(&spec, "t_temp").is_none());
    }

    #[test]
    fn test_swap_and_describe() {
        let builder = builder();
        assert_eq!(
            builder.swap_table("orders_temp", "orders"),
            "ALTER TABLE \"orders_temp\" SWAP WITH \"orders\""
        );
        assert_eq!(
            builder.table_info("orders"),
            "DESCRIBE TABLE \"PUBLIC\".\"orders\""
        );
        assert_eq!(
            builder.drop_stage("db-writer-1-2"),
            "DROP STAGE IF EXISTS \"db-writer-1-2\""
        );
    }

    #[test]
    fn test_preflight_statements() {
        let builder = builder();
        assert_eq!(builder.use_warehouse("LOADING"), "USE WAREHOUSE \"LOADING\";");
        assert_eq!(builder.use_schema("PUBLIC"), "USE SCHEMA \"PUBLIC\";");
        assert_eq!(builder.describe_user("LOADER"), "DESC USER \"LOADER\";");
    }
}
