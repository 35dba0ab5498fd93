pub mod api;
pub mod collab;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod store;
pub mod workflow;

pub use self::{config::Config, error::Error, workflow::Workflow};
