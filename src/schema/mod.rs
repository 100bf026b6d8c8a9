//! Static table definitions: columns, defaults and many-to-many relations.
//! Every table implicitly carries `id` (UUID primary key), `created_at`, `updated_at` and `deleted_at`.

mod validator;
pub use validator::validate;

/// Columns every table carries in addition to its declared ones.
pub const ID_COLUMN: &str = "id";
pub const TIMESTAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Varchar(u32),
    Text,
    Boolean,
    SmallInt,
    Integer,
}

impl ColumnType {
    /// PostgreSQL type name, used both in DDL and as a cast on bound parameters.
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Varchar(n) => format!("varchar({})", n),
            ColumnType::Text => "text".into(),
            ColumnType::Boolean => "boolean".into(),
            ColumnType::SmallInt => "smallint".into(),
            ColumnType::Integer => "integer".into(),
        }
    }

    /// Whether a non-null JSON value fits this column the way the bound `$n::type` cast would.
    pub fn accepts(&self, v: &serde_json::Value) -> bool {
        match self {
            ColumnType::Varchar(n) => v.as_str().is_some_and(|s| s.chars().count() <= *n as usize),
            ColumnType::Text => v.is_string(),
            ColumnType::Boolean => v.is_boolean(),
            ColumnType::SmallInt => v.as_i64().is_some_and(|n| i16::try_from(n).is_ok()),
            ColumnType::Integer => v.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
        }
    }
}

/// Column default usable in a `static` definition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
}

impl Literal {
    pub fn to_json(self) -> serde_json::Value {
        match self {
            Literal::Bool(b) => serde_json::Value::Bool(b),
            Literal::Int(n) => serde_json::Value::Number(n.into()),
        }
    }

    pub fn to_sql(self) -> String {
        match self {
            Literal::Bool(b) => b.to_string(),
            Literal::Int(n) => n.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<Literal>,
}

/// Many-to-many association stored in a join table of (owner id, related id) pairs.
#[derive(Debug)]
pub struct RelationDef {
    /// Key under which related records are materialized on read (e.g. "categories").
    pub name: &'static str,
    /// Request field carrying the related id set on write (e.g. "categories_id").
    pub input_field: &'static str,
    pub join_table: &'static str,
    pub owner_column: &'static str,
    pub related_column: &'static str,
    pub related: &'static TableDef,
}

#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
}

impl TableDef {
    /// Names of every column in select order: id, declared columns, timestamps.
    pub fn all_column_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.columns.len() + 4);
        names.push(ID_COLUMN);
        names.extend(self.columns.iter().map(|c| c.name));
        names.extend(TIMESTAMP_COLUMNS);
        names
    }
}
