//! blenv CLI
//!
//! Usage:
//!   blenv create                     # write .blenv.yaml and .env
//!   blenv show [--full]              # print the resolved configuration
//!   blenv check                      # validate configuration and env files
//!   blenv list                       # list environments
//!   blenv run [env] [--debug]        # run Blender with an environment
//!   blenv run render -- -b -a        # replace the generated arguments
//!   blenv system -- --version        # run the system Blender directly

use argh::FromArgs;
use blenv::cli::{self, BlenvArgs};

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let command_name = argv.first().map(String::as_str).unwrap_or("blenv");
    let rest = argv.get(1..).unwrap_or_default();

    // Everything after `--` goes to Blender untouched
    let (own_args, passthrough) = cli::split_passthrough(rest);
    let own_args: Vec<&str> = own_args.iter().map(String::as_str).collect();

    let args = match BlenvArgs::from_args(&[command_name], &own_args) {
        Ok(args) => args,
        Err(early_exit) => {
            match early_exit.status {
                Ok(()) => println!("{}", early_exit.output),
                Err(()) => eprintln!("{}", early_exit.output),
            }
            std::process::exit(if early_exit.status.is_ok() { 0 } else { 1 });
        }
    };

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(cli::log_filter(&args.log_level));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();

    match cli::run(args, passthrough).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
