mod parser;
mod schema;

pub use parser::parse_yaml;
pub use schema::{MigrationPlan, PhaseSpec, SubTaskSpec};
