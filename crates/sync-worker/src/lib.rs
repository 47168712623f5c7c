pub mod controller;
pub mod index;
pub mod models;
pub mod server;
