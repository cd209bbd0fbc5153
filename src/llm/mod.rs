pub mod gateway;
pub mod types;
