use anyhow::Result;
use clap::{Parser, Subcommand};

use cms_cli::config::Config;
use cms_cli::init::{self, InitOptions};
use cms_cli::publish::{PublishOptions, Publisher};
use cms_cli::ui;

#[derive(Parser)]
#[command(
    name = "cms-cli",
    version,
    about = "Scaffold projects from templates and publish them through the git workflow"
)]
struct Args {
    #[arg(long, global = true, help = "Show extra progress detail")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new project from a remote template
    Init {
        /// Name of the project to create
        project_name: Option<String>,

        #[arg(short, long, help = "Scaffold into a non-empty directory without asking")]
        force: bool,
    },
    /// Publish the project in the current directory
    Publish {
        #[arg(long, help = "Re-select the git hosting platform")]
        refresh_server: bool,

        #[arg(long, help = "Re-enter the access token")]
        refresh_token: bool,

        #[arg(long, help = "Re-select repository ownership")]
        refresh_owner: bool,

        #[arg(long, help = "Build command passed to the cloud build service")]
        build_cmd: Option<String>,

        #[arg(long, help = "Production publish: tag the release and merge to master")]
        prod: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::new(args.verbose) {
        Ok(config) => config,
        Err(e) => {
            ui::display_error(&format!("Configuration error: {}", e));
            std::process::exit(1);
        }
    };

    let outcome = match args.command {
        Command::Init {
            project_name,
            force,
        } => init::run(&config, project_name, &InitOptions { force }),
        Command::Publish {
            refresh_server,
            refresh_token,
            refresh_owner,
            build_cmd,
            prod,
        } => {
            let options = PublishOptions {
                refresh_server,
                refresh_token,
                refresh_owner,
                build_cmd,
                prod,
            };
            let dir = std::env::current_dir()?;
            Publisher::new(&config, options).run(&dir)
        }
    };

    if let Err(e) = outcome {
        ui::display_error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}
