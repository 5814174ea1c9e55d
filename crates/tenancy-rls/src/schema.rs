//! In-memory schema graph.
//!
//! A [`SchemaGraph`] is an immutable snapshot of tables, columns and
//! foreign-key edges taken at the start of a policy generation run. Column
//! comments are parsed into [`Annotation`]s here, so malformed comments and
//! dangling comment constraints fail at construction time.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::classifier::Annotation;
use crate::error::RlsError;

/// A column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    pub comment: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, nullable: bool, comment: Option<&str>) -> Self {
        Self {
            name: name.into(),
            nullable,
            comment: comment.map(str::to_string),
        }
    }
}

/// A single-column foreign key as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl ForeignKeyInfo {
    pub fn new(
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
        }
    }
}

/// Source of table, column and foreign-key metadata.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// List base tables of a schema.
    async fn list_tables(&self, schema: &str) -> anyhow::Result<Vec<String>>;

    /// List columns of a table, in ordinal order.
    async fn list_columns(&self, schema: &str, table: &str) -> anyhow::Result<Vec<ColumnInfo>>;

    /// List single-column foreign keys of a table.
    async fn list_foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> anyhow::Result<Vec<ForeignKeyInfo>>;
}

/// Raw description of one table, before annotations are resolved.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, name: &str, nullable: bool, comment: Option<&str>) -> Self {
        self.columns.push(ColumnInfo::new(name, nullable, comment));
        self
    }

    pub fn foreign_key(mut self, column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        self.foreign_keys
            .push(ForeignKeyInfo::new(column, foreign_table, foreign_column));
        self
    }
}

/// A column with its parsed annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub nullable: bool,
    pub annotation: Annotation,
}

/// Where an edge was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    ForeignKey,
    Comment,
}

/// A directed reference from a column to a column of another (or the same) table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    /// Inherited from the source column.
    pub nullable: bool,
    /// Annotation of the source column.
    pub annotation: Annotation,
    pub origin: EdgeOrigin,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub edges: Vec<ForeignKeyEdge>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Tables of one schema with their outgoing edges.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    tables: BTreeMap<String, Table>,
}

impl SchemaGraph {
    /// Build the graph from raw table snapshots.
    ///
    /// Fails on malformed `rls` comments and on comment constraints that reference
    /// a table or column missing from the snapshot.
    pub fn from_snapshots(snapshots: Vec<TableSnapshot>) -> Result<Self, RlsError> {
        let mut tables = BTreeMap::new();

        for snapshot in &snapshots {
            let columns = snapshot
                .columns
                .iter()
                .map(|c| -> Result<Column, RlsError> {
                    Ok(Column {
                        name: c.name.clone(),
                        nullable: c.nullable,
                        annotation: Annotation::parse(
                            &snapshot.name,
                            &c.name,
                            c.comment.as_deref(),
                        )?,
                    })
                })
                .collect::<Result<Vec<_>, RlsError>>()?;

            tables.insert(
                snapshot.name.clone(),
                Table {
                    name: snapshot.name.clone(),
                    columns,
                    edges: Vec::new(),
                },
            );
        }

        for snapshot in &snapshots {
            let edges = Self::edges_for(snapshot, &tables)?;
            if let Some(table) = tables.get_mut(&snapshot.name) {
                table.edges = edges;
            }
        }

        Ok(Self { tables })
    }

    /// Introspect a schema and build its graph.
    pub async fn introspect(
        introspector: &dyn SchemaIntrospector,
        schema: &str,
    ) -> Result<Self, RlsError> {
        let mut snapshots = Vec::new();

        for table in introspector.list_tables(schema).await? {
            let columns = introspector.list_columns(schema, &table).await?;
            let foreign_keys = introspector.list_foreign_keys(schema, &table).await?;
            snapshots.push(TableSnapshot {
                name: table,
                columns,
                foreign_keys,
            });
        }

        tracing::debug!(schema, tables = snapshots.len(), "Introspected schema");

        Self::from_snapshots(snapshots)
    }

    fn edges_for(
        snapshot: &TableSnapshot,
        tables: &BTreeMap<String, Table>,
    ) -> Result<Vec<ForeignKeyEdge>, RlsError> {
        let Some(table) = tables.get(&snapshot.name) else {
            return Ok(Vec::new());
        };
        let mut edges: Vec<ForeignKeyEdge> = Vec::new();

        for fk in &snapshot.foreign_keys {
            let Some(column) = table.column(&fk.column) else {
                tracing::warn!(
                    table = %snapshot.name,
                    column = %fk.column,
                    "Skipping foreign key on unknown column"
                );
                continue;
            };
            edges.push(ForeignKeyEdge {
                source_table: table.name.clone(),
                source_column: column.name.clone(),
                target_table: fk.foreign_table.clone(),
                target_column: fk.foreign_column.clone(),
                nullable: column.nullable,
                annotation: column.annotation.clone(),
                origin: EdgeOrigin::ForeignKey,
            });
        }

        for column in &table.columns {
            let Annotation::ExplicitRef {
                table: ref_table,
                column: ref_column,
            } = &column.annotation
            else {
                continue;
            };

            let unknown = |reference: String| RlsError::UnknownReference {
                table: table.name.clone(),
                column: column.name.clone(),
                reference,
            };
            let target = tables
                .get(ref_table)
                .ok_or_else(|| unknown(format!("table '{ref_table}'")))?;
            if target.column(ref_column).is_none() {
                return Err(unknown(format!("column '{ref_table}.{ref_column}'")));
            }

            // A comment constraint restating a real foreign key adds nothing.
            let duplicate = edges.iter().any(|e| {
                e.source_column == column.name
                    && e.target_table == *ref_table
                    && e.target_column == *ref_column
            });
            if duplicate {
                continue;
            }

            edges.push(ForeignKeyEdge {
                source_table: table.name.clone(),
                source_column: column.name.clone(),
                target_table: ref_table.clone(),
                target_column: ref_column.clone(),
                nullable: column.nullable,
                annotation: column.annotation.clone(),
                origin: EdgeOrigin::Comment,
            });
        }

        Ok(edges)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Outgoing edges of a table; empty for unknown tables.
    pub fn edges_from(&self, name: &str) -> &[ForeignKeyEdge] {
        self.tables
            .get(name)
            .map(|t| t.edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_key_edges_inherit_column_nullability() {
        let graph = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("posts")
                .column("id", false, None)
                .column("tenant_id", true, Some("rls"))
                .foreign_key("tenant_id", "tenants", "id"),
        ])
        .unwrap();

        let edges = graph.edges_from("posts");
        assert_eq!(edges.len(), 1);
        assert!(edges[0].nullable);
        assert_eq!(edges[0].annotation, Annotation::Include);
        assert_eq!(edges[0].origin, EdgeOrigin::ForeignKey);
    }

    #[test]
    fn test_comment_constraint_creates_edge() {
        let graph = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("users")
                .column("id", false, None)
                .column("tenant_id", false, Some("rls tenants.id")),
        ])
        .unwrap();

        let edges = graph.edges_from("users");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_table, "tenants");
        assert_eq!(edges[0].origin, EdgeOrigin::Comment);
    }

    #[test]
    fn test_comment_restating_foreign_key_is_not_duplicated() {
        let graph = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("users")
                .column("tenant_id", false, Some("rls tenants.id"))
                .foreign_key("tenant_id", "tenants", "id"),
        ])
        .unwrap();

        assert_eq!(graph.edges_from("users").len(), 1);
    }

    #[test]
    fn test_comment_constraint_to_unknown_table_fails() {
        let err = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("users").column("tenant_id", false, Some("rls tenantz.id")),
        ])
        .unwrap_err();
        assert!(matches!(err, RlsError::UnknownReference { .. }));
        assert!(err.to_string().contains("tenantz"));
    }

    #[test]
    fn test_comment_constraint_to_unknown_column_fails() {
        let err = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("users").column("tenant_id", false, Some("rls tenants.key")),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("tenants.key"));
    }

    #[test]
    fn test_unknown_tables_have_no_edges() {
        let graph = SchemaGraph::default();
        assert!(graph.edges_from("missing").is_empty());
        assert!(graph.is_empty());
    }
}
