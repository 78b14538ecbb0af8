pub mod client;
pub mod config;
pub mod manager;
pub mod model;
pub mod node_group;
pub mod provider;
