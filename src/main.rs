use clap::{Parser, Subcommand};
use plate_inspector::{app, config, logging, run_once, start_app};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plate_inspector", version, about = "License plate and helmet detection client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local HTTP front end (default).
    Serve,
    /// Analyze a single image and print the report.
    Detect {
        image: PathBuf,
        /// Write the rendered image here when it can be loaded.
        #[arg(long)]
        save_image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::get_configuration()?;
    logging::setup_logging(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => start_app(config).await,
        Command::Detect { image, save_image } => {
            let report = run_once(&config, &image).await?;
            print!("{report}");

            if let Some(path) = save_image {
                if app::save_asset(&report, &path)? {
                    tracing::info!("Saved image to {}", path.display());
                } else {
                    tracing::warn!("No image to save");
                }
            }

            if !report.outcome.succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
