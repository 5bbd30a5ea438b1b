use serde::{Deserialize, Serialize};

use crate::model::Id;

/// A genre owns many movies; the inverse side (`movies`) is never stored on
/// the genre itself and is derived through `movies.genre_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Id,
    pub name: String,
}

/// Input model for creating a genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGenre {
    pub name: String,
}

/// Genre update model for PATCH operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Genre {
    pub fn apply_update(&mut self, update: GenreUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
    }
}
