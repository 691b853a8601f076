pub mod db;
pub mod email;
pub mod http;
pub mod processor;
pub mod queue;
pub mod rate_limit;
pub mod signature;
