pub mod engine;
pub mod handlers;
pub mod history;
pub mod prompts;
pub mod session;
