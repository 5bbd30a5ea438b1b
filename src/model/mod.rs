pub mod actor;
pub mod common;
pub mod genre;
pub mod movie;

pub use actor::*;
pub use common::*;
pub use genre::*;
pub use movie::*;
