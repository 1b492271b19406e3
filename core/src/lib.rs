pub mod db;
pub mod error;
pub mod generation;
pub mod models;
pub mod service;
