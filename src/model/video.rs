use crate::model::{Category, Entity, Genre, CATEGORIES, GENRES};
use crate::schema::{ColumnDef, ColumnType, Literal, RelationDef, TableDef};
use crate::validation::{Rule, RuleSet, ValidationContract};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accepted values for `rating`.
pub const RATING_LIST: &[&str] = &["L", "10", "12", "14", "16", "18"];

pub static VIDEOS: TableDef = TableDef {
    name: "videos",
    columns: &[
        ColumnDef {
            name: "title",
            ty: ColumnType::Varchar(255),
            nullable: false,
            default: None,
        },
        ColumnDef {
            name: "description",
            ty: ColumnType::Text,
            nullable: false,
            default: None,
        },
        ColumnDef {
            name: "year_launched",
            ty: ColumnType::SmallInt,
            nullable: false,
            default: None,
        },
        ColumnDef {
            name: "opened",
            ty: ColumnType::Boolean,
            nullable: false,
            default: Some(Literal::Bool(false)),
        },
        ColumnDef {
            name: "rating",
            ty: ColumnType::Varchar(3),
            nullable: false,
            default: None,
        },
        ColumnDef {
            name: "duration",
            ty: ColumnType::Integer,
            nullable: false,
            default: None,
        },
    ],
    relations: &[
        RelationDef {
            name: "categories",
            input_field: "categories_id",
            join_table: "category_video",
            owner_column: "video_id",
            related_column: "category_id",
            related: &CATEGORIES,
        },
        RelationDef {
            name: "genres",
            input_field: "genres_id",
            join_table: "genre_video",
            owner_column: "video_id",
            related_column: "genre_id",
            related: &GENRES,
        },
    ],
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub year_launched: i16,
    pub opened: bool,
    pub rating: String,
    pub duration: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Entity for Video {
    fn table() -> &'static TableDef {
        &VIDEOS
    }

    fn contract() -> ValidationContract {
        ValidationContract::uniform(
            RuleSet::new()
                .field("title", vec![Rule::Required, Rule::String, Rule::Max(255)])
                .field("description", vec![Rule::Required, Rule::String])
                .field("year_launched", vec![Rule::Required, Rule::DateFormat("Y")])
                .field("opened", vec![Rule::Boolean])
                .field("rating", vec![Rule::Required, Rule::In(RATING_LIST)])
                .field("duration", vec![Rule::Required, Rule::Integer])
                .field(
                    "categories_id",
                    vec![Rule::Required, Rule::Array, Rule::Exists(&CATEGORIES)],
                )
                .field(
                    "genres_id",
                    vec![Rule::Required, Rule::Array, Rule::Exists(&GENRES)],
                ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_store_record_without_relations() {
        let video: Video = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "title": "t",
            "description": "d",
            "year_launched": 2010,
            "opened": false,
            "rating": "L",
            "duration": 90,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00+00:00",
            "deleted_at": null,
        }))
        .unwrap();
        assert!(video.categories.is_empty());
        assert!(video.genres.is_empty());
        assert_eq!(video.year_launched, 2010);
    }
}
