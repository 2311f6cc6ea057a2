pub mod agent;
pub mod artifact;
pub mod config;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod handlers;
pub mod markers;
pub mod orchestrator;
pub mod report;
pub mod run;
pub mod stage;
pub mod stop;
pub mod ui;
