pub mod collaborators;
pub mod memory;
pub mod port_handler;
pub mod runtime;
pub mod session_tools;
pub mod tab_handler;
