pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord;
pub mod handlers;
pub mod ports;
pub mod quota;
pub mod raid;
pub mod reconcile;
pub mod resolver;
pub mod ui;
pub mod utils;
