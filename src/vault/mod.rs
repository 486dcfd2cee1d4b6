pub mod client;
pub mod vault_model;
