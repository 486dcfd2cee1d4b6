pub mod message_model;
pub mod port;
