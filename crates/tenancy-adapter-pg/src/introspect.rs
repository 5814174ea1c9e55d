//! Schema introspection over `information_schema`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tenancy_rls::{ColumnInfo, ForeignKeyInfo, SchemaIntrospector};

const TABLES_SQL: &str = r#"
select table_name
from information_schema.tables
where table_type = 'BASE TABLE'
  and table_schema = $1
order by table_name
"#;

const COLUMNS_SQL: &str = r#"
select
  c.column_name,
  c.is_nullable,
  col_description(
    format('%I.%I', c.table_schema, c.table_name)::regclass,
    c.ordinal_position::int
  ) as column_comment
from information_schema.columns c
where c.table_schema = $1 and c.table_name = $2
order by c.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
select
  tc.constraint_name,
  kcu.column_name as column_name,
  ccu.table_schema as foreign_table_schema,
  ccu.table_name as foreign_table_name,
  ccu.column_name as foreign_column_name
from information_schema.table_constraints tc
join information_schema.key_column_usage kcu
  on tc.constraint_name = kcu.constraint_name
 and tc.table_schema = kcu.table_schema
join information_schema.constraint_column_usage ccu
  on ccu.constraint_name = tc.constraint_name
 and ccu.table_schema = tc.table_schema
where tc.constraint_type = 'FOREIGN KEY'
  and tc.table_schema = $1
  and tc.table_name = $2
order by tc.constraint_name, kcu.ordinal_position
"#;

/// [`SchemaIntrospector`] backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgSchemaIntrospector {
    pool: PgPool,
}

impl PgSchemaIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct ForeignKeyColumn {
    column: String,
    foreign_schema: String,
    foreign_table: String,
    foreign_column: String,
}

#[async_trait]
impl SchemaIntrospector for PgSchemaIntrospector {
    async fn list_tables(&self, schema: &str) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(row.try_get("table_name")?);
        }
        Ok(tables)
    }

    async fn list_columns(&self, schema: &str, table: &str) -> anyhow::Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            let comment: Option<String> = row.try_get("column_comment")?;
            columns.push(ColumnInfo::new(name, is_nullable == "YES", comment.as_deref()));
        }
        Ok(columns)
    }

    async fn list_foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> anyhow::Result<Vec<ForeignKeyInfo>> {
        let rows = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        // Grouped by constraint name for stability
        let mut constraints: BTreeMap<String, Vec<ForeignKeyColumn>> = BTreeMap::new();
        for row in rows {
            let name: String = row.try_get("constraint_name")?;
            constraints.entry(name).or_default().push(ForeignKeyColumn {
                column: row.try_get("column_name")?,
                foreign_schema: row.try_get("foreign_table_schema")?,
                foreign_table: row.try_get("foreign_table_name")?,
                foreign_column: row.try_get("foreign_column_name")?,
            });
        }

        let mut foreign_keys = Vec::new();
        for (name, mut columns) in constraints {
            if columns.len() != 1 {
                tracing::warn!(
                    table,
                    constraint = %name,
                    columns = columns.len(),
                    "Skipping multi-column foreign key"
                );
                continue;
            }
            let Some(fk) = columns.pop() else { continue };
            if fk.foreign_schema != schema {
                tracing::warn!(
                    table,
                    constraint = %name,
                    foreign_schema = %fk.foreign_schema,
                    "Skipping foreign key into another schema"
                );
                continue;
            }
            foreign_keys.push(ForeignKeyInfo::new(fk.column, fk.foreign_table, fk.foreign_column));
        }
        Ok(foreign_keys)
    }
}
