//! CityGuide — administrative command-line entry point.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cityguide_app::{validate, AppContext};
use cityguide_core::CityGuideConfig;

fn resolve_data_dir() -> PathBuf {
    std::env::var("CITYGUIDE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn data_dir_arg(args: &[String], pos: usize) -> PathBuf {
    args.get(pos).map(PathBuf::from).unwrap_or_else(resolve_data_dir)
}

fn open_context(data_dir: PathBuf) -> anyhow::Result<AppContext> {
    info!("Data directory: {}", data_dir.display());
    let config = CityGuideConfig::from_env(&data_dir)?;
    AppContext::open(config).map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))
}

fn print_help() {
    println!("CityGuide — local data tools");
    println!();
    println!("Usage: cityguide <command>");
    println!();
    println!("Commands:");
    println!("  init [data-dir]                Create or migrate the database and load fixtures");
    println!("  validate [data-dir]            Validate an existing database");
    println!("  download-city <id> [data-dir]  Install a city package from the fixtures directory");
    println!("  help                           Show this help message");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "init" => {
            let ctx = open_context(data_dir_arg(&args, 2))?;
            let stats = ctx.store.get_stats()?;
            println!("Database:  {}", stats.db_path);
            println!("Cities:    {}", stats.cities);
            println!("Places:    {}", stats.places);
            println!("Tours:     {}", stats.tours);
            println!("Stops:     {}", stats.tour_points);
            println!("Users:     {}", stats.users);
        }
        "--validate" | "validate" => {
            let report = validate::validate(&data_dir_arg(&args, 2));
            validate::print_report(&report);
            std::process::exit(if report.db_valid { 0 } else { 1 });
        }
        "download-city" => {
            let Some(city_id) = args.get(2).and_then(|s| s.parse::<i64>().ok()) else {
                eprintln!("Usage: cityguide download-city <city-id> [data-dir]");
                std::process::exit(1);
            };
            let ctx = open_context(data_dir_arg(&args, 3))?;
            let report = ctx.store.download_city_data(
                city_id,
                ctx.config.default_user_id,
                &ctx.config.data_paths.fixtures,
            )?;
            println!(
                "City {} installed: {} places, {} tours",
                city_id, report.places, report.tours
            );
        }
        "--help" | "-h" | "help" => print_help(),
        _ => {
            eprintln!("Unknown command: {}. Use 'cityguide help' for usage.", command);
            std::process::exit(1);
        }
    }

    Ok(())
}
