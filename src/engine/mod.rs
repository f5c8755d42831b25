// Firmware Site Engine - Core module structure
pub mod config;
pub mod database;
pub mod keystore;
pub mod crypto;
pub mod updater;
pub mod api;
pub mod site;
pub mod cli;

pub use config::Config;
pub use database::Database;
pub use site::Site;
