pub mod frame_manager;
pub mod message_handler;
