//! Command-line interface for blenv

use crate::config::{
    ConfigDocument, ConfigError, EnvFileError, EnvVariableSet, DEFAULT_CONFIG_FILENAME,
    DEFAULT_ENVIRONMENT, DEFAULT_ENV_FILENAME,
};
use crate::runtime::{
    CompileOptions, EnvDirective, ExecutableLocator, HostProcess, LaunchPlan, ProcessError,
};
use argh::FromArgs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Manage and run named Blender launch environments
#[derive(FromArgs, Debug)]
pub struct BlenvArgs {
    /// path to the configuration file (default: .blenv.yaml)
    #[argh(option, short = 'c', default = "String::from(DEFAULT_CONFIG_FILENAME)")]
    pub config: String,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"warn\")")]
    pub log_level: String,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Command {
    Create(CreateArgs),
    Show(ShowArgs),
    Check(CheckArgs),
    List(ListArgs),
    Run(RunArgs),
    System(SystemArgs),
}

/// Write a default configuration and env file
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "create")]
pub struct CreateArgs {
    /// replace existing files without asking
    #[argh(switch)]
    pub overwrite: bool,

    /// env file to create (default: .env)
    #[argh(option, default = "String::from(DEFAULT_ENV_FILENAME)")]
    pub env_file: String,
}

/// Print the resolved configuration
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "show")]
pub struct ShowArgs {
    /// include fields that still have their default value
    #[argh(switch)]
    pub full: bool,
}

/// Validate the configuration and every referenced env file
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "check")]
pub struct CheckArgs {}

/// List configured environments
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "list")]
pub struct ListArgs {}

/// Run Blender with an environment (arguments after `--` replace the generated ones)
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "run")]
pub struct RunArgs {
    /// environment name (default: default)
    #[argh(positional, default = "String::from(DEFAULT_ENVIRONMENT)")]
    pub env_name: String,

    /// print the launch plan as JSON instead of running
    #[argh(switch)]
    pub debug: bool,

    /// blend file to open instead of the configured one
    #[argh(option, short = 't')]
    pub target: Option<String>,

    /// extra argument appended after the generated ones (repeatable)
    #[argh(option, short = 'x')]
    pub extra: Vec<String>,
}

/// Run the system Blender directly (arguments after `--` are passed through)
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "system")]
pub struct SystemArgs {
    /// env file to load before launch
    #[argh(option)]
    pub env_file: Option<String>,

    /// use only the env file's variables
    #[argh(switch)]
    pub isolated: bool,

    /// keep existing variables when the env file defines them too
    #[argh(switch)]
    pub keep_existing: bool,

    /// print the launch plan as JSON instead of running
    #[argh(switch)]
    pub debug: bool,
}

/// Split `args` at the first `--`; everything after it is passed through verbatim
pub fn split_passthrough(args: &[String]) -> (Vec<String>, Option<Vec<String>>) {
    match args.iter().position(|a| a == "--") {
        Some(index) => (args[..index].to_vec(), Some(args[index + 1..].to_vec())),
        None => (args.to_vec(), None),
    }
}

/// Normalize a log level name, falling back to `warn`
pub fn log_filter(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "warn",
    }
}

/// Errors surfaced by CLI commands
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Failed to render launch plan: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Execute a parsed command line, returning the process exit code
pub async fn run(args: BlenvArgs, passthrough: Option<Vec<String>>) -> Result<i32, CliError> {
    let config_path = PathBuf::from(&args.config);

    match args.command {
        Command::Create(create) => {
            let project_root = std::env::current_dir()?;
            create_files(
                &project_root,
                &config_path,
                Path::new(&create.env_file),
                create.overwrite,
            )?;
            Ok(0)
        }
        Command::Show(show) => {
            let doc = ConfigDocument::from_file(&config_path)?;
            print!("{}", doc.dump(show.full)?);

            let default_env = doc.get_default()?;
            let vars = EnvVariableSet::from_file(&default_env.env_file_path)?;
            println!();
            println!("# {}", default_env.env_file_path);
            print!("{}", vars.to_text());
            Ok(0)
        }
        Command::Check(_) => {
            let doc = ConfigDocument::from_file(&config_path)?;
            for (name, spec) in doc.iter() {
                let vars = EnvVariableSet::from_file(&spec.env_file_path)?;
                log::debug!(
                    "Environment '{}': {} variables from {}",
                    name,
                    vars.len(),
                    spec.env_file_path
                );
            }
            println!("Configuration '{}' is valid", config_path.display());
            println!("  Environments: {}", doc.names().join(", "));
            Ok(0)
        }
        Command::List(_) => {
            let doc = ConfigDocument::from_file(&config_path)?;
            for (name, spec) in doc.iter() {
                match &spec.inherit {
                    Some(parent) => println!("{} (inherits {})", name, parent),
                    None => println!("{}", name),
                }
            }
            Ok(0)
        }
        Command::Run(run_args) => {
            let doc = ConfigDocument::from_file(&config_path)?;
            let spec = doc.get(&run_args.env_name)?;

            let options = CompileOptions {
                target_file: run_args.target,
                extra_args: (!run_args.extra.is_empty()).then_some(run_args.extra),
                override_args: passthrough,
            };
            let plan = LaunchPlan::compile(&run_args.env_name, spec, &options);
            execute(plan, run_args.debug).await
        }
        Command::System(system) => {
            let directive = match system.env_file {
                Some(env_file) if system.isolated => EnvDirective::Isolated {
                    env_file: PathBuf::from(env_file),
                },
                Some(env_file) => EnvDirective::Merge {
                    env_file: PathBuf::from(env_file),
                    override_existing: !system.keep_existing,
                },
                None => EnvDirective::Ambient,
            };
            let executable = ExecutableLocator::default().locate();
            let plan = LaunchPlan::direct(
                executable.to_string_lossy(),
                passthrough.unwrap_or_default(),
                directive,
            );
            execute(plan, system.debug).await
        }
    }
}

/// Print or launch a plan
async fn execute(plan: LaunchPlan, debug: bool) -> Result<i32, CliError> {
    if debug {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    log::info!("{}", plan.to_string().trim_end());
    let mut interrupts = install_interrupt_handler()?;
    let mut process = HostProcess::new(plan);
    let code = process.launch(&mut interrupts).await?;

    Ok(match code {
        Some(code) => code,
        // Killed after the user asked it to stop
        None if process.was_interrupted() => 0,
        None => 1,
    })
}

/// Forward Ctrl+C presses into a channel
fn install_interrupt_handler() -> Result<mpsc::UnboundedReceiver<()>, CliError> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

/// Write the default configuration and env file, asking before replacing either
///
/// The document's default environment points at `env_path`.
fn create_files(
    project_root: &Path,
    config_path: &Path,
    env_path: &Path,
    overwrite: bool,
) -> Result<(), CliError> {
    let project_name = project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let doc = ConfigDocument::default_for(
        &ExecutableLocator::default(),
        project_name,
        env_path.to_string_lossy(),
    );
    match doc.write(config_path, overwrite, false) {
        Ok(()) => println!("wrote: {}", config_path.display()),
        Err(ConfigError::AlreadyExists(path)) => {
            if confirm(&format!("{} already exists. Overwrite?", path.display()))? {
                doc.write(config_path, true, false)?;
                println!("wrote: {}", config_path.display());
            } else {
                println!("not overwriting: {}", config_path.display());
            }
        }
        Err(e) => return Err(e.into()),
    }

    let vars = EnvVariableSet::defaults(project_root);
    match vars.write(env_path, overwrite) {
        Ok(()) => println!("wrote: {}", env_path.display()),
        Err(EnvFileError::AlreadyExists(path)) => {
            if confirm(&format!("{} already exists. Overwrite?", path.display()))? {
                vars.write(env_path, true)?;
                println!("wrote: {}", env_path.display());
            } else {
                println!("not overwriting: {}", env_path.display());
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn confirm(question: &str) -> std::io::Result<bool> {
    print!("{} [y/n] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
