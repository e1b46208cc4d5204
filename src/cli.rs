use crate::config::policy::{ReadinessPolicy, ServiceProfile};
use crate::config::types::LaunchError;
use crate::exec::search_path;
use crate::kernel::readiness::ReadinessController;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure a kernel service's control device is ready
    Ensure {
        /// Kernel service (module) name
        service: String,
        /// Device node prefix, including the trailing separator
        #[arg(long)]
        prefix: Option<PathBuf>,
        /// Control device to probe instead of the device node
        #[arg(long)]
        control_device: Option<PathBuf>,
        /// Loader helper used when module loading is enabled
        #[arg(long)]
        loader: Option<PathBuf>,
        /// Print the readiness evidence as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the readiness policy resolved from the environment
    Policy {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace this process with a command resolved through PATH
    Exec {
        /// Command name or path
        name: String,
        /// Arguments passed to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a command resolved through PATH and wait for it
    Run {
        /// Command name or path
        name: String,
        /// Arguments passed to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Shell convention: 126 for "found but not runnable", 127 for "not found"
fn launch_exit_code(err: &LaunchError) -> i32 {
    match err {
        LaunchError::NotFound => 127,
        LaunchError::PermissionDenied | LaunchError::ExecFailed(_) => 126,
        _ => 1,
    }
}

fn argv_for(name: &str, args: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(name.to_string());
    argv.extend(args.iter().cloned());
    argv
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ensure {
            service,
            prefix,
            control_device,
            loader,
            json,
        } => {
            let mut profile = ServiceProfile::default();
            if let Some(prefix) = prefix {
                profile.device_prefix = prefix;
            }
            if let Some(loader) = loader {
                profile.loader = loader;
            }
            profile.control_device = control_device;

            let controller = ReadinessController::new(profile);
            match controller.ensure_ready(&service) {
                Ok(evidence) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&evidence)?);
                    } else {
                        println!(
                            "{} ready ({} probes, {} ms)",
                            evidence.control_device.display(),
                            evidence.probes,
                            evidence.elapsed_ms
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{}", e.remediation(&service, controller.profile()));
                    std::process::exit(e.errno() as i32);
                }
            }
        }
        Commands::Policy { json } => {
            let profile = ServiceProfile::default();
            let policy = ReadinessPolicy::from_env(&profile);
            if json {
                println!("{}", serde_json::to_string_pretty(&policy)?);
            } else {
                println!("{}: {}", profile.loading_var, policy.load_enabled);
                println!("{}: {}s", profile.timeout_var, policy.timeout_secs);
            }
            Ok(())
        }
        Commands::Exec { name, args } => {
            let argv = argv_for(&name, &args);
            let envp = search_path::inherited_environment();
            let err = match search_path::execute_by_name(&name, &argv, &envp) {
                Ok(never) => match never {},
                Err(e) => e,
            };
            eprintln!("devgate: {}: {}", name, err);
            std::process::exit(launch_exit_code(&err));
        }
        Commands::Run { name, args } => {
            let argv = argv_for(&name, &args);
            let envp = search_path::inherited_environment();
            match search_path::spawn_by_name(&name, &argv, &envp) {
                Ok(status) => {
                    log::info!("{} exited: {}", name, status);
                    std::process::exit(status.code().unwrap_or(1));
                }
                Err(e) => {
                    eprintln!("devgate: {}: {}", name, e);
                    std::process::exit(launch_exit_code(&e));
                }
            }
        }
    }
}
