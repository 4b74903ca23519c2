use crate::demo::{run_demo, DemoArgs};
use crate::infra::load_catalog;
use clap::{Args, Parser, Subcommand};
use ods_licensing::config::AppConfig;
use ods_licensing::error::AppError;
use ods_licensing::telemetry;
use ods_licensing::workflows::licensing::{Co2Calculator, LicensingError, LineItem, MassUnit};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "ODS Licensing Console",
    about = "Exercise the ODS importer licensing engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a registration-to-approval walkthrough against the in-memory store (default command)
    Demo(DemoArgs),
    /// Print the refrigerant catalog in effect
    Catalog(CatalogArgs),
    /// Compute the CO2-equivalent of a single line item
    Co2(Co2Args),
}

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogArgs {
    /// Load the catalog from this CSV instead of the configured source
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct Co2Args {
    /// Refrigerant code, for example R-134a
    #[arg(long)]
    pub(crate) code: String,
    /// Number of containers
    #[arg(long, default_value_t = 1)]
    pub(crate) quantity: u32,
    /// Fill of one container
    #[arg(long)]
    pub(crate) volume: f64,
    /// Mass unit of the fill (g, kg, lb, oz, ton)
    #[arg(long, default_value = "kg")]
    pub(crate) unit: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    debug!(environment = ?config.environment, "configuration loaded");

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(&config, args).await,
        Command::Catalog(args) => print_catalog(&config, args),
        Command::Co2(args) => print_co2(&config, args),
    }
}

fn print_catalog(config: &AppConfig, args: CatalogArgs) -> Result<(), AppError> {
    let catalog = load_catalog(args.csv.as_deref().or(config.licensing.catalog_path.as_deref()))?;

    println!("{} refrigerants", catalog.len());
    for entry in catalog.entries() {
        let gwp = entry
            .gwp
            .map(|value| format!("{value:>8.0}"))
            .unwrap_or_else(|| format!("{:>8}", "unknown"));
        let flag = if entry.restricted { "restricted" } else { "" };
        println!("  {:<10} GWP {gwp} {flag}", entry.code);
    }
    Ok(())
}

fn print_co2(config: &AppConfig, args: Co2Args) -> Result<(), AppError> {
    let catalog = load_catalog(config.licensing.catalog_path.as_deref())?;
    let entry = catalog.get(&args.code);
    let item = LineItem {
        refrigerant_code: entry
            .map(|entry| entry.code.clone())
            .unwrap_or_else(|| args.code.trim().to_string()),
        quantity: args.quantity,
        volume: args.volume,
        unit: args.unit.clone(),
        gwp: entry.and_then(|entry| entry.gwp),
    };

    let calculator = Co2Calculator::new(config.licensing.unknown_factor_policy);
    debug!(policy = ?calculator.policy(), "unknown factor handling");
    let total = calculator
        .total(std::slice::from_ref(&item))
        .map_err(LicensingError::from)?;
    let unit = MassUnit::parse(&item.unit)
        .map(MassUnit::symbol)
        .unwrap_or(item.unit.as_str());

    println!(
        "{} x {} {} of {} (GWP {}) = {:.2} kg CO2e",
        item.quantity,
        item.volume,
        unit,
        item.refrigerant_code,
        item.gwp
            .map(|gwp| gwp.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        total
    );
    Ok(())
}
