pub mod associations;
pub mod pagination;
pub mod projection;
pub mod query;

pub use associations::AssociationManager;
pub use pagination::{Page, PageBase, PageLimits, PageRequest};
pub use projection::{ActorView, GenreSummary, GenreView, MovieSummary, MovieView};
pub use query::QueryEngine;
