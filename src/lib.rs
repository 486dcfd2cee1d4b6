pub mod background;
pub mod cli;
pub mod content;
pub mod dom;
pub mod error;
pub mod flows;
pub mod forms;
pub mod messages;
pub mod report;
pub mod trace;
pub mod vault;
