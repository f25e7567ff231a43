pub mod batch;
pub mod estimator;
pub mod graph;
pub mod orchestrator;
pub mod tracker;
pub mod workers;
