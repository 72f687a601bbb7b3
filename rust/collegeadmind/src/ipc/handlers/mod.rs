pub mod catalog;
pub mod core;
pub mod fees;
pub mod setup;
pub mod students;
pub mod templates;
pub mod upload;
