pub mod config;
pub mod handlers;
pub mod models;
pub mod outcome;
pub mod services;
pub mod startup;
pub mod store;

pub use startup::{AppState, Application};
