//! Database layer for runlog

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::RunRepository;
