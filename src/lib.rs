pub mod assignment;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod time;
pub mod workers;

pub use lifecycle::BookingService;
pub use workers::Sweeper;
