use crate::model::Entity;
use crate::schema::{ColumnDef, ColumnType, Literal, TableDef};
use crate::validation::{Rule, RuleSet, ValidationContract};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub static GENRES: TableDef = TableDef {
    name: "genres",
    columns: &[
        ColumnDef {
            name: "name",
            ty: ColumnType::Varchar(255),
            nullable: false,
            default: None,
        },
        ColumnDef {
            name: "description",
            ty: ColumnType::Text,
            nullable: true,
            default: None,
        },
        ColumnDef {
            name: "is_active",
            ty: ColumnType::Boolean,
            nullable: false,
            default: Some(Literal::Bool(true)),
        },
    ],
    relations: &[],
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Genre {
    fn table() -> &'static TableDef {
        &GENRES
    }

    fn contract() -> ValidationContract {
        ValidationContract::uniform(
            RuleSet::new()
                .field("name", vec![Rule::Required, Rule::String, Rule::Max(255)])
                .field("description", vec![Rule::String])
                .field("is_active", vec![Rule::Boolean]),
        )
    }
}
