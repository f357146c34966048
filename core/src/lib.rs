pub mod aggregate;
pub mod db;
pub mod gemini;
pub mod models;
pub mod reconcile;
pub mod service;
