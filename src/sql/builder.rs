//! Builds parameterized INSERT, SELECT, UPDATE and join-table statements from table definitions.
//! Identifiers come only from static definitions; every value is a bound parameter.

use crate::schema::{ColumnDef, RelationDef, TableDef, ID_COLUMN};
use crate::store::Record;
use serde_json::Value;
use uuid::Uuid;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Pushes a value and returns its placeholder with a cast, e.g. `$3::smallint`.
    fn push_param(&mut self, v: Value, cast: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), cast)
    }

    fn push_id(&mut self, id: Uuid) -> String {
        self.push_param(Value::String(id.to_string()), "uuid")
    }
}

fn select_column_list(table: &TableDef) -> String {
    table
        .all_column_names()
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn live_filter(include_deleted: bool) -> &'static str {
    if include_deleted {
        ""
    } else {
        " AND \"deleted_at\" IS NULL"
    }
}

/// Value to write for a column on insert: `None` leaves the column to its DB default.
fn insert_value(c: &ColumnDef, body: &Record) -> Option<Value> {
    match body.get(c.name) {
        Some(Value::Null) if !c.nullable && c.default.is_some() => None,
        Some(v) => Some(v.clone()),
        None if c.default.is_some() => None,
        None => Some(Value::Null),
    }
}

/// INSERT with a store-generated id. Timestamps come from column defaults.
pub fn insert(schema: &str, table: &TableDef, id: Uuid, body: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = vec![quoted(ID_COLUMN)];
    let mut placeholders = vec![q.push_id(id)];
    for c in table.columns {
        let Some(val) = insert_value(c, body) else { continue };
        cols.push(quoted(c.name));
        placeholders.push(q.push_param(val, &c.ty.sql()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        qualified_table(schema, table.name),
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(table)
    );
    q
}

/// SELECT by primary key.
pub fn select_by_id(schema: &str, table: &TableDef, id: Uuid, include_deleted: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_id(id);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}{}",
        select_column_list(table),
        qualified_table(schema, table.name),
        quoted(ID_COLUMN),
        ph,
        live_filter(include_deleted)
    );
    q
}

/// SELECT all rows in creation order.
pub fn select_list(schema: &str, table: &TableDef, include_deleted: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE TRUE{} ORDER BY \"created_at\", {}",
        select_column_list(table),
        qualified_table(schema, table.name),
        live_filter(include_deleted),
        quoted(ID_COLUMN)
    );
    q
}

pub fn count(schema: &str, table: &TableDef, include_deleted: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM {} WHERE TRUE{}",
        qualified_table(schema, table.name),
        live_filter(include_deleted)
    );
    q
}

fn id_placeholders(q: &mut QueryBuf, ids: &[Uuid]) -> String {
    ids.iter().map(|id| q.push_id(*id)).collect::<Vec<_>>().join(", ")
}

/// SELECT live rows WHERE id IN (...). Empty `ids` yields a query matching nothing.
pub fn select_by_ids(schema: &str, table: &TableDef, ids: &[Uuid]) -> QueryBuf {
    select_in(schema, table, ids, &select_column_list(table))
}

/// SELECT id of live rows WHERE id IN (...).
pub fn select_existing_ids(schema: &str, table: &TableDef, ids: &[Uuid]) -> QueryBuf {
    select_in(schema, table, ids, &quoted(ID_COLUMN))
}

fn select_in(schema: &str, table: &TableDef, ids: &[Uuid], cols: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let full = qualified_table(schema, table.name);
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, full);
        return q;
    }
    let placeholders = id_placeholders(&mut q, ids);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}){} ORDER BY \"created_at\", {}",
        cols,
        full,
        quoted(ID_COLUMN),
        placeholders,
        live_filter(false),
        quoted(ID_COLUMN)
    );
    q
}

/// UPDATE a live row: SET only declared columns present in body, plus `updated_at`.
/// Null is skipped for NOT NULL columns.
pub fn update(schema: &str, table: &TableDef, id: Uuid, body: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in table.columns {
        match body.get(c.name) {
            Some(Value::Null) if !c.nullable => {}
            Some(v) => {
                let ph = q.push_param(v.clone(), &c.ty.sql());
                sets.push(format!("{} = {}", quoted(c.name), ph));
            }
            None => {}
        }
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let id_ph = q.push_id(id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}{} RETURNING {}",
        qualified_table(schema, table.name),
        sets.join(", "),
        quoted(ID_COLUMN),
        id_ph,
        live_filter(false),
        select_column_list(table)
    );
    q
}

/// Soft delete: stamp `deleted_at` on a live row.
pub fn soft_delete(schema: &str, table: &TableDef, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = q.push_id(id);
    q.sql = format!(
        "UPDATE {} SET \"deleted_at\" = NOW(), \"updated_at\" = NOW() WHERE {} = {}{} RETURNING {}",
        qualified_table(schema, table.name),
        quoted(ID_COLUMN),
        id_ph,
        live_filter(false),
        quoted(ID_COLUMN)
    );
    q
}

pub fn select_related_ids(schema: &str, relation: &RelationDef, owner: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_id(owner);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        quoted(relation.related_column),
        qualified_table(schema, relation.join_table),
        quoted(relation.owner_column),
        ph
    );
    q
}

/// INSERT join rows, skipping pairs already present.
pub fn attach(schema: &str, relation: &RelationDef, owner: Uuid, ids: &[Uuid]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let owner_ph = q.push_id(owner);
    let rows: Vec<String> = ids
        .iter()
        .map(|id| format!("({}, {})", owner_ph, q.push_id(*id)))
        .collect();
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES {} ON CONFLICT DO NOTHING",
        qualified_table(schema, relation.join_table),
        quoted(relation.owner_column),
        quoted(relation.related_column),
        rows.join(", ")
    );
    q
}

pub fn detach(schema: &str, relation: &RelationDef, owner: Uuid, ids: &[Uuid]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let owner_ph = q.push_id(owner);
    let placeholders = id_placeholders(&mut q, ids);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} IN ({})",
        qualified_table(schema, relation.join_table),
        quoted(relation.owner_column),
        owner_ph,
        quoted(relation.related_column),
        placeholders
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CATEGORIES, VIDEOS};
    use serde_json::json;

    fn body(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_skips_defaulted_columns_and_casts_params() {
        let id = Uuid::nil();
        let q = insert("public", &CATEGORIES, id, &body(json!({ "name": "n", "ignored": 1 })));
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"categories\" (\"id\", \"name\", \"description\") \
             VALUES ($1::uuid, $2::varchar(255), $3::text) RETURNING \"id\", \"name\", \
             \"description\", \"is_active\", \"created_at\", \"updated_at\", \"deleted_at\""
        );
        assert_eq!(q.params, vec![json!(id.to_string()), json!("n"), Value::Null]);
    }

    #[test]
    fn explicit_null_on_defaulted_column_uses_default() {
        let q = insert("public", &CATEGORIES, Uuid::nil(), &body(json!({ "name": "n", "is_active": null })));
        assert!(!q.sql.contains("$4"));
        let q = insert("public", &CATEGORIES, Uuid::nil(), &body(json!({ "name": "n", "is_active": false })));
        assert!(q.sql.contains("$4::boolean"));
    }

    #[test]
    fn reads_filter_soft_deleted_unless_asked() {
        let live = select_by_id("public", &CATEGORIES, Uuid::nil(), false);
        assert!(live.sql.ends_with("WHERE \"id\" = $1::uuid AND \"deleted_at\" IS NULL"));
        let all = select_by_id("public", &CATEGORIES, Uuid::nil(), true);
        assert!(all.sql.ends_with("WHERE \"id\" = $1::uuid"));

        assert!(select_list("public", &CATEGORIES, false).sql.contains("\"deleted_at\" IS NULL"));
        assert!(!select_list("public", &CATEGORIES, true).sql.contains("\"deleted_at\" IS NULL"));
    }

    #[test]
    fn update_sets_present_columns_and_refreshes_updated_at() {
        let q = update(
            "public",
            &CATEGORIES,
            Uuid::nil(),
            &body(json!({ "description": null, "is_active": null, "id": "x" })),
        );
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"categories\" SET \"description\" = $1::text, \"updated_at\" = NOW() \
             WHERE \"id\" = $2::uuid AND \"deleted_at\" IS NULL RETURNING \"id\", \"name\", \
             \"description\", \"is_active\", \"created_at\", \"updated_at\", \"deleted_at\""
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn join_statements_share_owner_param() {
        let rel = &VIDEOS.relations[0];
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let q = attach("public", rel, Uuid::nil(), &[a, b]);
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"category_video\" (\"video_id\", \"category_id\") \
             VALUES ($1::uuid, $2::uuid), ($1::uuid, $3::uuid) ON CONFLICT DO NOTHING"
        );
        let q = detach("public", rel, Uuid::nil(), &[a]);
        assert_eq!(
            q.sql,
            "DELETE FROM \"public\".\"category_video\" WHERE \"video_id\" = $1::uuid \
             AND \"category_id\" IN ($2::uuid)"
        );
    }

    #[test]
    fn empty_id_set_matches_nothing() {
        let q = select_existing_ids("public", &CATEGORIES, &[]);
        assert!(q.sql.ends_with("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }
}
