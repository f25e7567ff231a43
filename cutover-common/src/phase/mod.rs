mod record;
mod status;
mod sub_task;

pub use record::MigrationPhase;
pub use status::{PhaseKind, PhaseStatus};
pub use sub_task::SubTask;
