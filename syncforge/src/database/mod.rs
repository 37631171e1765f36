//! Database layer: pool setup, row models and repositories.

pub mod db;
pub mod models;
pub mod repositories;

pub use db::create_pool;
