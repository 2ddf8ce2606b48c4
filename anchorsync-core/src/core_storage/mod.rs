//! Local persistence of the saved world map

pub mod errors;
pub mod map_store;

pub use errors::{PersistenceError, PersistenceResult};
pub use map_store::MapStore;
