use serde::{Deserialize, Serialize};

use crate::model::Id;

/// A movie as persisted.
///
/// `actor_ids` mirrors the movie's rows in the movie/actor link table,
/// ascending and duplicate-free. Saving a movie rewrites that whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: Id,
    pub title: String,
    pub release_year: i32,
    pub duration: i32,
    pub genre_id: Id,
    pub actor_ids: Vec<Id>,
}

/// Input model for creating a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovie {
    pub title: String,
    pub release_year: i32,
    pub duration: i32,
    pub genre_id: Id,
    #[serde(default)]
    pub actor_ids: Vec<Id>,
}

/// Movie update model for PATCH operations.
/// Every field is independently present or absent; zero is a real value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_ids: Option<Vec<Id>>,
}

impl Movie {
    /// Apply the scalar fields of an update. Genre and actor changes need
    /// resolution against the store and are applied by the association
    /// manager.
    pub fn apply_update(&mut self, update: &MovieUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(release_year) = update.release_year {
            self.release_year = release_year;
        }
        if let Some(duration) = update.duration {
            self.duration = duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Movie {
        Movie {
            id: 1,
            title: "Heat".to_string(),
            release_year: 1995,
            duration: 170,
            genre_id: 3,
            actor_ids: vec![2, 4],
        }
    }

    #[test]
    fn test_apply_update_only_touches_present_fields() {
        let mut movie = sample();
        movie.apply_update(&MovieUpdate {
            duration: Some(171),
            ..Default::default()
        });
        assert_eq!(movie.title, "Heat");
        assert_eq!(movie.release_year, 1995);
        assert_eq!(movie.duration, 171);
    }

    #[test]
    fn test_update_distinguishes_zero_from_absent() {
        let absent: MovieUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.release_year, None);

        let zero: MovieUpdate = serde_json::from_str(r#"{"releaseYear": 0}"#).unwrap();
        assert_eq!(zero.release_year, Some(0));
    }

    #[test]
    fn test_new_movie_defaults_to_no_actors() {
        let new_movie: NewMovie = serde_json::from_str(
            r#"{"title": "Alien", "releaseYear": 1979, "duration": 117, "genreId": 1}"#,
        )
        .unwrap();
        assert!(new_movie.actor_ids.is_empty());
    }
}
