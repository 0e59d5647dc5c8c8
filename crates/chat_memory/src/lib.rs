pub mod config;
pub mod database;
pub mod dialog;
pub mod generator;
pub mod history;
pub mod orchestrator;
pub mod utils;
