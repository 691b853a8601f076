pub mod repository;
pub mod settlement;
pub mod types;
