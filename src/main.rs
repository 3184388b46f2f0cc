//! Anycast endpoint scanner - command-line entry point

use anycast_endpoint_scanner::{
    app::App,
    cli::Cli,
    config::{load_config, EnvManager},
    error::{AppError, Result},
    PKG_NAME, VERSION,
};
use clap::Parser;
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(AppError::internal("panic").exit_code());
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    if cli.print_env_example {
        print!("{}", EnvManager::create_example_env_content());
        return Ok(());
    }

    if cli.debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!(
            "Built {} from {}",
            option_env!("BUILD_TIME").unwrap_or("unknown time"),
            option_env!("GIT_COMMIT").unwrap_or("unknown commit")
        );
    }

    let config = load_config(cli)?;
    App::new(config).run().await?;
    Ok(())
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file (see --print-env-example)");
            eprintln!("  - HTTP/3 probing needs TLS enabled");
            eprintln!("  - Facility codes are letters only, e.g. SJC,LAX");
        }
        AppError::Catalog(_) => {
            eprintln!();
            eprintln!("Location catalog help:");
            eprintln!("  - Delete a corrupt cache file and run again");
            eprintln!("  - Point --locations-url at a reachable copy of the catalog");
        }
        AppError::Io(_) => {
            eprintln!();
            eprintln!("File help:");
            eprintln!("  - Check that the input file exists (-f)");
            eprintln!("  - Check that the output directory is writable (-o)");
        }
        _ => {}
    }
}
