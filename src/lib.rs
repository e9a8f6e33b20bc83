pub mod agent;
pub mod config;
pub mod errors;
pub mod gate;
pub mod graph;
pub mod init;
pub mod ledger;
pub mod orchestrator;
pub mod reflect;
pub mod scaffold;
pub mod scheduler;
pub mod settings;
pub mod tracker;
pub mod ui;
pub mod util;
