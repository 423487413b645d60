use clap::Parser;

use metasync::Settings;
use metasync::cli::commands::{directories, init, serve, status, sync};
use metasync::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Init { force } => return init::run_init(force),
        command => command,
    };

    let config_path = cli.config.clone().unwrap_or_else(Settings::config_path);
    let settings = Settings::load_from(&config_path).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });
    metasync::logging::init_with_config(&settings.logging);

    match command {
        Commands::Init { .. } => {}

        Commands::AddDir {
            path,
            writer,
            priority,
        } => {
            let writers = metasync::WriterRegistry::with_defaults();
            let entry = directories::add_dir(&config_path, &path, &writer, priority, &writers)?;
            println!(
                "Added {} (writer {}, priority {})",
                entry.path.display(),
                entry.writer,
                entry.priority
            );
        }

        Commands::RemoveDir { path } => {
            if directories::remove_dir(&config_path, &path)? {
                println!("Removed {}. Its records are purged on the next pass.", path.display());
            } else {
                println!("{} was not monitored.", path.display());
            }
        }

        Commands::ListDirs => directories::list_dirs(&settings),

        Commands::Sync { dir, force } => {
            tokio::task::spawn_blocking(move || sync::run_sync(&settings, dir, force)).await??
        }

        Commands::IndexFile { path } => sync::run_index_file(&settings, &path)?,

        Commands::Search { query, limit, json } => {
            sync::run_search(&settings, &query, limit, json)?
        }

        Commands::Status => status::run_status(&settings)?,

        Commands::Serve { interval, watch } => {
            serve::run(serve::ServeArgs { interval, watch }, settings).await?
        }
    }

    Ok(())
}
