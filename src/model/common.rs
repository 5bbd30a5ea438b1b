use serde::{Deserialize, Serialize};

/// Store-assigned identity. Monotonic per entity kind and never reused.
pub type Id = i64;

/// Earliest release year accepted for a movie.
pub const FIRST_RELEASE_YEAR: i32 = 1888;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Movie,
    Actor,
    Genre,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EntityKind::Movie => write!(f, "movie"),
            EntityKind::Actor => write!(f, "actor"),
            EntityKind::Genre => write!(f, "genre"),
        }
    }
}

/// Collapse a requested id list into the ascending, duplicate-free set the
/// link tables store.
pub fn normalize_ids(ids: &[Id]) -> Vec<Id> {
    use itertools::Itertools;
    ids.iter().copied().sorted_unstable().dedup().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ids_sorts_and_dedups() {
        assert_eq!(normalize_ids(&[5, 1, 5, 3, 1]), vec![1, 3, 5]);
        assert!(normalize_ids(&[]).is_empty());
    }

    #[test]
    fn test_entity_kind_display_matches_serde() {
        assert_eq!(EntityKind::Genre.to_string(), "genre");
        assert_eq!(serde_json::to_string(&EntityKind::Actor).unwrap(), "\"actor\"");
    }
}
