pub mod app;
pub mod commands;
pub mod encrypt;
pub mod env;
pub mod replay;
pub mod validate;
