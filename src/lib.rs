pub mod auth;
pub mod booking;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sql;
pub mod sweeper;
pub mod wal;
pub mod wire;
