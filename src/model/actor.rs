use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::Id;

/// An actor as persisted. The movies an actor appears in live only in the
/// movie/actor link table and are looked up through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Id,
    pub name: String,
    pub birth_date: NaiveDate,
}

/// Input model for creating an actor, optionally linked to existing movies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActor {
    pub name: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub movie_ids: Vec<Id>,
}

/// Actor update model for PATCH operations.
///
/// `movie_ids`, when present, replaces the actor's whole movie set. An
/// explicitly empty list clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_ids: Option<Vec<Id>>,
}

impl Actor {
    /// Apply the scalar fields of an update. Link changes are handled by the
    /// association manager.
    pub fn apply_update(&mut self, update: &ActorUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(birth_date) = update.birth_date {
            self.birth_date = birth_date;
        }
    }
}
