use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};

use stroke_api::api::ApiServer;
use stroke_api::config::{StrokeConfig, DEFAULT_CONFIG_PATH};
use stroke_api::table::{load_table, read_csv, write_parquet};
use stroke_api::{PatientQuery, StrokeError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct StrokeApiArgs {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, help = "Configuration file")]
    config: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Verbose level")]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the patient table and serve the HTTP API
    Serve {
        #[arg(short, long, help = "Listen address, host:port")]
        bind: Option<String>,
        #[arg(short, long, help = "Patient table (.parquet or .csv)")]
        data: Option<PathBuf>,
    },
    /// Convert the raw CSV export into the Parquet table the service loads
    Convert {
        #[arg(short, long, help = "Raw CSV export")]
        input: PathBuf,
        #[arg(short, long, help = "Parquet output path")]
        output: PathBuf,
    },
    /// Print global statistics as JSON
    Stats {
        #[arg(short, long, help = "Patient table (.parquet or .csv)")]
        data: Option<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<(), StrokeError> {
    let cli = StrokeApiArgs::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(log_level)
        .parse_env(Env::default())
        .init();

    debug!("Arguments {:#?}", cli);

    let config = StrokeConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Serve { bind, data } => {
            let data_path = data.unwrap_or_else(|| config.data.path.clone());
            let bind_address = bind.unwrap_or_else(|| config.bind_address());

            let table = load_table(data_path).await?;
            let query = Arc::new(PatientQuery::with_memo_capacity(
                table,
                config.data.memo_capacity,
            ));
            ApiServer::new(query, bind_address, config.server.workers)
                .run()
                .await?;
        }
        Command::Convert { input, output } => {
            let start_time = Instant::now();
            let table = read_csv(&input)?;
            write_parquet(&output, &table)?;
            info!(
                "converted {} patients from {:?} to {:?} in {:?}",
                table.len(),
                input,
                output,
                start_time.elapsed()
            );
        }
        Command::Stats { data } => {
            let data_path = data.unwrap_or_else(|| config.data.path.clone());
            let query = PatientQuery::new(load_table(data_path).await?);
            let stats = query.global_statistics()?;
            println!("{}", serde_json::to_string_pretty(stats.as_ref())?);
        }
    }

    Ok(())
}
