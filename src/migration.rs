//! Apply table definitions to the database: schema, entity tables, then join tables.
//! Every statement is idempotent (IF NOT EXISTS), so migrations run on every start.

use crate::error::AppError;
use crate::schema::{self, TableDef, ID_COLUMN};
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;

/// DDL statements for `tables` in dependency order.
pub fn ddl(schema_name: &str, tables: &[&TableDef]) -> Vec<String> {
    let mut statements = vec![format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema_name))];

    for t in tables {
        let mut col_defs = vec![format!("{} UUID NOT NULL", quoted(ID_COLUMN))];
        for c in t.columns {
            let mut def = format!("{} {}", quoted(c.name), c.ty.sql());
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = c.default {
                def.push_str(" DEFAULT ");
                def.push_str(&d.to_sql());
            }
            col_defs.push(def);
        }
        for (name, def_suffix) in [
            ("created_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
            ("updated_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
            ("deleted_at", "TIMESTAMPTZ"),
        ] {
            col_defs.push(format!("{} {}", quoted(name), def_suffix));
        }
        col_defs.push(format!("PRIMARY KEY ({})", quoted(ID_COLUMN)));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            qualified_table(schema_name, t.name),
            col_defs.join(",\n  ")
        ));
    }

    for t in tables {
        for rel in t.relations {
            let owner = quoted(rel.owner_column);
            let related = quoted(rel.related_column);
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} UUID NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n  \
                 {} UUID NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n  PRIMARY KEY ({}, {})\n)",
                qualified_table(schema_name, rel.join_table),
                owner,
                qualified_table(schema_name, t.name),
                quoted(ID_COLUMN),
                related,
                qualified_table(schema_name, rel.related.name),
                quoted(ID_COLUMN),
                owner,
                related
            ));
        }
    }

    statements
}

/// Validate `tables` and create everything they describe in `schema_name`.
pub async fn apply_migrations(pool: &PgPool, schema_name: &str, tables: &[&TableDef]) -> Result<(), AppError> {
    schema::validate(tables)?;
    for sql in ddl(schema_name, tables) {
        tracing::debug!(%sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(schema = %schema_name, tables = tables.len(), "migrations applied");
    Ok(())
}
