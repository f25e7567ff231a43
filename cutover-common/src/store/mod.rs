mod cache;
mod object;
mod relational;
mod run_store;

pub mod default;

pub use cache::CacheStore;
pub use object::{ObjectMeta, ObjectStore};
pub use relational::{RelationalStore, RowPage, TableRow};
pub use run_store::RunStore;
