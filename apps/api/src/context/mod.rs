pub mod assembler;
pub mod bundle;
pub mod extract;
pub mod handlers;
pub mod prompts;
pub mod validation;
