//! Destination for cleaned tables.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scorecard_core::{ColumnKind, NormalizedTables, Table, TableSchema, ALL_TABLES};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

/// Postgres caps a statement at 65535 bind parameters.
const BIND_LIMIT: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Existing rows are deleted before the insert.
    #[default]
    Replace,
    /// Rows whose key is already stored are left alone.
    Append,
}

impl LoadMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(LoadMode::Replace),
            "append" => Some(LoadMode::Append),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows: BTreeMap<&'static str, usize>,
}

#[async_trait]
pub trait TableSink: Send + Sync {
    /// Creates any missing destination tables.
    async fn create_tables(&self) -> Result<()>;

    async fn load(&self, tables: &NormalizedTables, mode: LoadMode) -> Result<LoadReport>;
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Id | ColumnKind::Text => "TEXT",
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Float | ColumnKind::Rate | ColumnKind::Money => "DOUBLE PRECISION",
    }
}

pub fn create_table_sql(schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| {
            let mut def = format!("{} {}", column.name, sql_type(column.kind));
            if column.name == schema.key {
                def.push_str(" PRIMARY KEY");
                if let Some(parent) = schema.parent {
                    def.push_str(&format!(" REFERENCES {parent}(id)"));
                }
            }
            def
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({columns})", schema.name)
}

pub fn insert_prefix(schema: &TableSchema) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        schema.name,
        schema.column_names().collect::<Vec<_>>().join(", ")
    )
}

/// Rows per insert statement for a table of this width.
pub fn chunk_size(schema: &TableSchema) -> usize {
    (BIND_LIMIT / schema.columns.len().max(1)).max(1)
}

#[derive(Debug, Clone)]
pub struct PgTableSink {
    pool: PgPool,
}

impl PgTableSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .context("connecting to destination database")?;
        info!("destination database pool ready");
        Ok(Self::new(pool))
    }
}

async fn create_all(conn: &mut PgConnection) -> Result<()> {
    for schema in ALL_TABLES {
        sqlx::query(&create_table_sql(schema))
            .execute(&mut *conn)
            .await
            .with_context(|| format!("creating {}", schema.name))?;
    }
    Ok(())
}

async fn insert_table(conn: &mut PgConnection, table: &Table, mode: LoadMode) -> Result<usize> {
    let schema = table.schema;
    for rows in table.rows.chunks(chunk_size(schema)) {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(insert_prefix(schema));
        builder.push_values(rows, |mut values, row| {
            for (column, cell) in schema.columns.iter().zip(row) {
                match column.kind {
                    ColumnKind::Id | ColumnKind::Text => {
                        values.push_bind(cell.canonical_text());
                    }
                    ColumnKind::Integer => {
                        values.push_bind(cell.as_f64().map(|v| v.round() as i64));
                    }
                    ColumnKind::Float | ColumnKind::Rate | ColumnKind::Money => {
                        values.push_bind(cell.as_f64());
                    }
                }
            }
        });
        if mode == LoadMode::Append {
            builder.push(format!(" ON CONFLICT ({}) DO NOTHING", schema.key));
        }
        builder
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting into {}", schema.name))?;
        debug!(table = schema.name, rows = rows.len(), "inserted chunk");
    }
    Ok(table.len())
}

#[async_trait]
impl TableSink for PgTableSink {
    async fn create_tables(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.context("opening transaction")?;
        create_all(&mut tx).await?;
        tx.commit().await.context("committing table creation")?;
        info!(tables = ALL_TABLES.len(), "destination tables ready");
        Ok(())
    }

    async fn load(&self, tables: &NormalizedTables, mode: LoadMode) -> Result<LoadReport> {
        let mut tx = self.pool.begin().await.context("opening transaction")?;
        create_all(&mut tx).await?;

        if mode == LoadMode::Replace {
            for schema in ALL_TABLES.iter().rev() {
                sqlx::query(&format!("DELETE FROM {}", schema.name))
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("clearing {}", schema.name))?;
            }
        }

        let mut report = LoadReport::default();
        for table in tables.tables() {
            let rows = insert_table(&mut tx, table, mode).await?;
            report.rows.insert(table.name(), rows);
        }

        tx.commit().await.context("committing load")?;
        info!(?mode, rows = ?report.rows, "loaded tables");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorecard_core::{DIM_ADMISSION, DIM_SCHOOL, DIM_TEST_SCORES};

    #[test]
    fn school_table_ddl_has_primary_key() {
        let sql = create_table_sql(&DIM_SCHOOL);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS dim_school (id TEXT PRIMARY KEY, "));
        assert!(sql.contains("school_name TEXT"));
        assert!(!sql.contains("REFERENCES"));
    }

    #[test]
    fn child_table_ddl_references_school() {
        let sql = create_table_sql(&DIM_ADMISSION);
        assert!(sql.contains("school_id TEXT PRIMARY KEY REFERENCES dim_school(id)"));
        assert!(sql.contains("admission_rate_overall DOUBLE PRECISION"));
    }

    #[test]
    fn insert_prefix_lists_columns_in_schema_order() {
        assert_eq!(
            insert_prefix(&DIM_ADMISSION),
            "INSERT INTO dim_admission (school_id, admission_rate_overall, admission_rate_by_ope_id, consumer_admission_rate, admission_score) "
        );
    }

    #[test]
    fn chunks_stay_under_bind_limit() {
        let rows = chunk_size(&DIM_TEST_SCORES);
        assert!(rows * DIM_TEST_SCORES.columns.len() <= BIND_LIMIT);
        assert!(rows > 1_000);
    }

    #[test]
    fn load_mode_parses_case_insensitively() {
        assert_eq!(LoadMode::parse("Append"), Some(LoadMode::Append));
        assert_eq!(LoadMode::parse(" replace "), Some(LoadMode::Replace));
        assert_eq!(LoadMode::parse("upsert"), None);
    }
}
