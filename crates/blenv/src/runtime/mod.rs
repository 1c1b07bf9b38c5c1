//! Turning resolved environments into running Blender processes

pub mod compiler;
pub mod locate;
pub mod process;

pub use compiler::*;
pub use locate::*;
pub use process::*;
