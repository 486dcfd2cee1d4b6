pub mod filler;
pub mod form_model;
pub mod forms_tools;
pub mod matchers;
pub mod scanner;
