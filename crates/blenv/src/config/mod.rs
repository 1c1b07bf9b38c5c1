//! Configuration document, env files and inheritance resolution

mod document;
mod env_file;
mod environment;
mod resolver;

pub use document::*;
pub use env_file::*;
pub use environment::*;
pub use resolver::*;
