mod local_fs_run_store;
mod memory_cache;
mod memory_object;
mod memory_relational;

pub use local_fs_run_store::*;
pub use memory_cache::*;
pub use memory_object::*;
pub use memory_relational::*;
