pub mod error;
pub mod flag;
pub mod ids;
pub mod resource;

pub use error::CoreError;
pub use flag::{FlagName, FlagRegistry, MAIN, PRIMARY};
pub use ids::*;
pub use resource::{ResourceRecord, ResourceView};
