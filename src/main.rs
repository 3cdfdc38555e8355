use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meteo_client::config::{parse_time_zone, ClientConfig};
use meteo_client::range::day_count;
use meteo_client::frame::write_json_lines;
use meteo_client::{DataFrame, MeteoClient, ObservationDate, DEFAULT_FORECAST_TYPE};

#[derive(Parser)]
#[command(name = "meteo")]
#[command(about = "Fetch meteo.lt forecasts and observations as tables", long_about = None)]
struct Cli {
    /// Time zone for timestamp columns (overrides METEO_TIME_ZONE)
    #[arg(long, global = true)]
    tz: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    /// One JSON object per row
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List places with forecasts
    Places,
    /// Show one place
    Place { place_code: String },
    /// List forecast types available for a place
    PlaceForecasts { place_code: String },
    /// Forecast for a place
    Forecast {
        place_code: String,
        #[arg(long, default_value = DEFAULT_FORECAST_TYPE)]
        forecast_type: String,
    },
    /// List observation stations
    Stations,
    /// Show one station
    Station { station_code: String },
    /// Show what observation data a station stores
    StationObservationInfo { station_code: String },
    /// Observations for one day (latest when --date is omitted)
    Observations {
        station_code: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Observations for every day between --from and --to, inclusive
    ObservationsRange {
        station_code: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    let _ = dotenvy::dotenv();

    // Initialize tracing, logging to stderr so tables on stdout stay clean
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = ClientConfig::from_env()?;
    if let Some(tz) = &cli.tz {
        config.time_zone = parse_time_zone(tz)?;
    }
    debug!("Loaded config: {:?}", config);

    // Create client
    let client = MeteoClient::from_config(&config)?;
    let tz = client.time_zone();

    // Fetch and normalize
    let mut frame = match cli.command {
        Command::Places => client.places().await?,
        Command::Place { place_code } => client.place_info(&place_code).await?,
        Command::PlaceForecasts { place_code } => client.place_forecasts(&place_code).await?,
        Command::Forecast {
            place_code,
            forecast_type,
        } => client.place_forecast(&place_code, &forecast_type, tz).await?,
        Command::Stations => client.stations().await?,
        Command::Station { station_code } => client.station_info(&station_code).await?,
        Command::StationObservationInfo { station_code } => {
            client.station_observation_info(&station_code).await?
        }
        Command::Observations { station_code, date } => {
            let date = date.map(ObservationDate::On).unwrap_or_default();
            client.station_observations(&station_code, date, tz).await?
        }
        Command::ObservationsRange {
            station_code,
            from,
            to,
        } => {
            let pb = ProgressBar::new(day_count(from, to) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("##-"),
            );
            let frame = client
                .station_observations_range_with(&station_code, from, to, tz, |progress| {
                    pb.set_message(progress.day.to_string());
                    pb.inc(1);
                })
                .await?;
            pb.finish_and_clear();
            info!("Fetched {} observations for {} to {}", frame.height(), from, to);
            frame
        }
    };

    print_frame(&mut frame, cli.format)?;
    Ok(())
}

fn print_frame(
    frame: &mut DataFrame,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Table => {
            // Show every column and row instead of the truncated default
            std::env::set_var("POLARS_FMT_MAX_COLS", "-1");
            std::env::set_var("POLARS_FMT_MAX_ROWS", "-1");
            println!("{frame}");
        }
        OutputFormat::Json => write_json_lines(frame, std::io::stdout().lock())?,
    }
    Ok(())
}
