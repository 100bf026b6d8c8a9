//! Catalog validation: referential integrity between table and relation definitions.

use crate::error::ConfigError;
use crate::schema::{TableDef, ID_COLUMN, TIMESTAMP_COLUMNS};
use std::collections::HashSet;

pub fn validate(tables: &[&TableDef]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for t in tables {
        if !names.insert(t.name) {
            return Err(ConfigError::DuplicateTable(t.name.to_string()));
        }
    }

    let mut join_tables = HashSet::new();
    for t in tables {
        let mut columns = HashSet::new();
        for c in t.columns {
            if c.name == ID_COLUMN || TIMESTAMP_COLUMNS.contains(&c.name) {
                return Err(ConfigError::Validation(format!(
                    "{}.{} is managed by the store and cannot be declared",
                    t.name, c.name
                )));
            }
            if !columns.insert(c.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate column {}.{}",
                    t.name, c.name
                )));
            }
        }

        for rel in t.relations {
            if !names.contains(rel.related.name) {
                return Err(ConfigError::MissingReference {
                    kind: "table",
                    id: rel.related.name.to_string(),
                });
            }
            if names.contains(rel.join_table) || !join_tables.insert(rel.join_table) {
                return Err(ConfigError::DuplicateTable(rel.join_table.to_string()));
            }
            if rel.owner_column == rel.related_column {
                return Err(ConfigError::Validation(format!(
                    "{}: owner and related columns must differ",
                    rel.join_table
                )));
            }
            if columns.contains(rel.input_field) {
                return Err(ConfigError::Validation(format!(
                    "{}.{} collides with a column",
                    t.name, rel.input_field
                )));
            }
        }
    }

    Ok(())
}
