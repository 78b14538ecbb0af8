pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod node_group;
pub mod oke;
pub mod provider;
pub mod reference;
pub mod registered_taints;
pub mod shapes;
