pub mod action;
pub mod engine;
pub mod executor;
pub mod history;
pub mod hybrid;
pub mod parser;
pub mod prompt;
pub mod trace;
pub mod verify;
