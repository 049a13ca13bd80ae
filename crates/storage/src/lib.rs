pub mod connection;
pub mod error;
mod queries;
pub mod schema;
pub mod store;
pub mod unit_of_work;

pub use connection::{SqliteConnectionManager, StoreConfig};
pub use error::StorageError;
pub use store::ResourceStore;
pub use unit_of_work::{Snapshot, UnitOfWork};
