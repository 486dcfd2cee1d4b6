pub mod fill_flow;
pub mod flow_model;
pub mod registry;
pub mod save_flow;
