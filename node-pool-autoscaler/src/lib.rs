pub mod client;
pub mod cloud_provider;
pub mod coordinator;
pub mod model;
pub mod retry;
pub mod taints;
pub mod template;
