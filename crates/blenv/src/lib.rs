//! blenv - named, inheritable Blender launch environments
//!
//! # Overview
//!
//! A project keeps its launch configurations in `.blenv.yaml`:
//! - Base environments name the Blender executable and an env file
//! - Derived environments `inherit` a base environment and override fields
//! - Each environment compiles to an argument vector and an env directive
//!
//! # Example Configuration
//!
//! ```yaml
//! schema: "1"
//!
//! project:
//!   name: hello-addon
//!   source: src
//!
//! environments:
//!   default:
//!     executable_path: /usr/bin/blender
//!     env_file_path: .env
//!     addons: [hello_addon]
//!
//!   render:
//!     inherit: default
//!     background: true
//!     python_expr: "import bpy; bpy.ops.render.render(write_still=True)"
//! ```
//!
//! Inheritance is one level deep: `render` may inherit from `default`, but
//! nothing may inherit from `render`.

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::BlenvArgs;
pub use config::{
    ConfigDocument, ConfigError, EnvFileError, EnvVariableSet, EnvironmentFields,
    EnvironmentSpec, ResolveError, ValidationError,
};
pub use runtime::{
    compile_args, CompileOptions, EnvDirective, ExecutableLocator, HostProcess, HostState,
    LaunchPlan, ProcessEnvironment, ProcessError,
};
