pub mod alert;
pub mod error;
pub mod metrics;
pub mod phase;
pub mod plan;
pub mod progress;
pub mod run;
pub mod store;
