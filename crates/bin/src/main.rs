//! Tidyfin CLI binary.
//!
//! Downloads public data, imports WRDS extracts into the local database and
//! runs the research workflows, printing tables to stdout.

mod integration;

use clap::{Parser, Subcommand, ValueEnum};
use integration::downloads::{
    PriceRequest, download_cpi, download_factors, download_industries, download_macro_predictors,
    download_prices,
};
use integration::logging::{init_logging, progress_bar};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tidyfin::data::Database;
use tidyfin::data::sources::french::FrenchDataset;
use tidyfin::data::store::tables::{
    CPI_MONTHLY, FACTORS_FF3_DAILY, FACTORS_FF3_MONTHLY, FACTORS_FF5_MONTHLY, INDUSTRIES_FF_MONTHLY,
    MACRO_PREDICTORS,
};
use tidyfin::models::{ClusterBy, EventStudyConfig};
use tidyfin::output::{Table, export_records};
use tidyfin::workflow::{self, SortVariable};
use tidyfin::{SamplePeriod, Settings};

#[derive(Parser)]
#[command(name = "tidyfin")]
#[command(about = "Tidyfin: empirical asset pricing research", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tidyfin.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that print results.
#[derive(clap::Args)]
struct OutputArgs {
    /// Print Markdown instead of a plain table
    #[arg(long)]
    markdown: bool,

    /// Also write the results to a .csv or .json file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download public datasets into the database
    Download {
        /// Dataset to fetch
        #[arg(value_enum)]
        dataset: Dataset,

        /// Symbols for `prices` (comma-separated; defaults to the config list)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Fetch prices even when they are already stored
        #[arg(long)]
        refresh: bool,
    },

    /// Import a WRDS CSV extract
    Import {
        /// Kind of extract
        #[arg(value_enum)]
        kind: Extract,

        /// Path to the CSV file
        path: PathBuf,

        /// CRSP-Compustat link table for `crsp-monthly`
        #[arg(long)]
        links: Option<PathBuf>,

        /// Append to `crsp_daily` instead of replacing it
        #[arg(long)]
        append: bool,
    },

    /// Estimate rolling CAPM betas into the `beta` table
    Betas,

    /// Sort stocks into portfolios on a lagged characteristic
    Sort {
        /// beta_monthly, beta_daily, size, bm or momentum
        variable: String,

        /// Control variable for a double sort
        #[arg(long)]
        control: Option<String>,

        /// Groups on the control variable
        #[arg(long, default_value = "5")]
        control_groups: usize,

        /// Sort within control groups instead of independently
        #[arg(long)]
        dependent: bool,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Fama-MacBeth regressions on beta, size and book-to-market
    FamaMacbeth {
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Replicate SMB and HML and compare with the published factors
    Replicate {
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Predictive regressions of the equity premium on macro predictors
    Predict {
        /// Newey-West lags
        #[arg(long, default_value = "6")]
        lags: usize,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Elastic-net selection of factors and macro predictors for industry returns
    FactorSelection {
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Price simulated options with an elastic net on polynomial features
    OptionPricing {
        /// Polynomial degree (defaults to the config value)
        #[arg(long)]
        degree: Option<usize>,

        /// Elastic-net penalty (defaults to the config value)
        #[arg(long)]
        lambda: Option<f64>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Mean-variance portfolios of the industries or a parametric stock policy
    PortfolioChoice {
        /// Method
        #[arg(value_enum, default_value = "mean-variance")]
        method: ChoiceMethod,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Difference-in-differences and event study on a panel CSV
    Did {
        /// CSV with entity, time, y and event_time (empty for controls)
        path: PathBuf,

        /// Periods before the event with their own coefficient
        #[arg(long, default_value = "4")]
        leads: i64,

        /// Periods after the event with their own coefficient
        #[arg(long, default_value = "4")]
        lags: i64,

        /// Clustering of the standard errors
        #[arg(long, value_enum, default_value = "entity")]
        cluster: Cluster,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Summary statistics of a table
    Summary {
        /// Table name
        table: String,

        /// Columns (comma-separated; defaults to all numeric columns)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Show tables, row counts and the database location
    Info,

    /// Reclaim unused database space
    Vacuum,
}

#[derive(Clone, Copy, ValueEnum)]
enum Dataset {
    /// Fama-French 3 factors, monthly
    Ff3,
    /// Fama-French 5 factors, monthly
    Ff5,
    /// Fama-French 3 factors, daily
    Ff3Daily,
    /// Ten industry portfolios, monthly
    Industries,
    /// Welch-Goyal macro predictors
    Macro,
    /// Consumer price index from FRED
    Cpi,
    /// Daily Yahoo Finance quotes
    Prices,
    /// Every dataset except prices
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChoiceMethod {
    /// Minimum-variance and efficient industry portfolios
    MeanVariance,
    /// Characteristic tilts of value weights maximising CRRA utility
    Parametric,
}

#[derive(Clone, Copy, ValueEnum)]
enum Cluster {
    /// Heteroskedasticity-robust, no clustering
    Robust,
    /// By entity
    Entity,
    /// By period
    Time,
    /// By entity and period
    TwoWay,
}

impl From<Cluster> for ClusterBy {
    fn from(cluster: Cluster) -> Self {
        match cluster {
            Cluster::Robust => Self::Robust,
            Cluster::Entity => Self::Entity,
            Cluster::Time => Self::Time,
            Cluster::TwoWay => Self::TwoWay,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Extract {
    /// CRSP monthly stock file
    CrspMonthly,
    /// CRSP daily stock file
    CrspDaily,
    /// Compustat annual fundamentals
    Compustat,
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::discover(cli.config.as_deref())?;
    let db = workflow::open_database(&settings)?;

    match cli.command {
        Commands::Download {
            dataset,
            symbols,
            refresh,
        } => download(&db, &settings, dataset, symbols, refresh).await?,
        Commands::Import {
            kind,
            path,
            links,
            append,
        } => {
            let summary = match kind {
                Extract::CrspMonthly => {
                    workflow::import_crsp_monthly(&db, &path, links.as_deref(), &settings.sample)?
                }
                Extract::CrspDaily => workflow::import_crsp_daily(&db, &path, &settings.sample, append)?,
                Extract::Compustat => workflow::import_compustat(&db, &path)?,
            };
            println!(
                "Imported {} of {} extract rows into {}",
                summary.rows, summary.raw_rows, summary.table
            );
        }
        Commands::Betas => {
            let summary = workflow::estimate_beta_table(&db, &settings)?;
            println!(
                "Estimated {} monthly and {} daily betas ({} rows in beta)",
                summary.monthly, summary.daily, summary.rows
            );
        }
        Commands::Sort {
            variable,
            control,
            control_groups,
            dependent,
            out,
        } => {
            let variable: SortVariable = variable.parse()?;
            let result = match control {
                Some(control) => workflow::double_sort(
                    &db,
                    variable,
                    control.parse()?,
                    control_groups,
                    dependent,
                    &settings,
                )?,
                None => workflow::portfolio_sort(&db, variable, &settings)?,
            };
            emit(&result.to_table(), &result.returns, &out)?;
        }
        Commands::FamaMacbeth { out } => {
            let result = workflow::characteristic_premia(&db, &settings)?;
            emit(&workflow::premia_table(&result), &result.premia, &out)?;
        }
        Commands::Replicate { out } => {
            let result = workflow::replicate_fama_french(&db)?;
            emit(&result.to_table(), &result.factors, &out)?;
        }
        Commands::Predict { lags, out } => {
            let regressions = workflow::predictive_regressions(&db, lags)?;
            emit(&workflow::predictive_table(&regressions), &regressions, &out)?;
        }
        Commands::FactorSelection { out } => {
            let result = workflow::select_factors(&db, &settings.factor_selection)?;
            emit(&result.to_table(), &result.industries, &out)?;
        }
        Commands::OptionPricing { degree, lambda, out } => {
            let mut config = settings.option_pricing.clone();
            config.degree = degree.unwrap_or(config.degree);
            config.lambda = lambda.unwrap_or(config.lambda);
            let result = workflow::price_options(&config)?;
            emit(&result.to_table(), std::slice::from_ref(&result), &out)?;
        }
        Commands::PortfolioChoice { method, out } => match method {
            ChoiceMethod::MeanVariance => {
                let result = workflow::mean_variance(&db, &settings.portfolio_choice)?;
                emit(&result.to_table(), &result.weights, &out)?;
            }
            ChoiceMethod::Parametric => {
                let result = workflow::parametric_policy(&db, &settings.portfolio_choice)?;
                emit(&result.to_table(), &result.policies, &out)?;
            }
        },
        Commands::Did {
            path,
            leads,
            lags,
            cluster,
            out,
        } => {
            let config = EventStudyConfig {
                leads,
                lags,
                cluster: cluster.into(),
            };
            let result = workflow::did_from_file(&path, &config)?;
            emit(&result.to_table(), &result.event, &out)?;
        }
        Commands::Summary { table, columns, out } => {
            let summary = workflow::summarise_table(&db, &table, &columns)?;
            emit(&summary.to_table(3), &summary.rows, &out)?;
        }
        Commands::Info => {
            println!("Database: {}", settings.database_path()?.display());
            println!("Sample:   {} to {}\n", settings.sample.start, settings.sample.end);
            println!("{}", workflow::database_table(&db)?);
        }
        Commands::Vacuum => {
            db.vacuum()?;
            println!("Database vacuumed");
        }
    }

    Ok(())
}

/// Print `table` and optionally export `records`.
fn emit<T: Serialize>(table: &Table, records: &[T], out: &OutputArgs) -> Result<(), Box<dyn std::error::Error>> {
    if out.markdown {
        println!("{}", table.to_markdown());
    } else {
        println!("{table}");
    }
    if let Some(path) = &out.output {
        export_records(records, path)?;
        println!("Wrote {} records to {}", records.len(), path.display());
    }
    Ok(())
}

async fn download(
    db: &Database,
    settings: &Settings,
    dataset: Dataset,
    symbols: Vec<String>,
    refresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let sample = &settings.sample;
    match dataset {
        Dataset::Prices => download_quotes(db, settings, symbols, refresh, sample).await?,
        Dataset::All => {
            for dataset in [
                Dataset::Ff3,
                Dataset::Ff5,
                Dataset::Ff3Daily,
                Dataset::Industries,
                Dataset::Macro,
                Dataset::Cpi,
            ] {
                download_table(db, dataset, sample).await?;
            }
        }
        table => download_table(db, table, sample).await?,
    }
    Ok(())
}

/// Fetch one single-request dataset and report the rows stored.
async fn download_table(
    db: &Database,
    dataset: Dataset,
    sample: &SamplePeriod,
) -> Result<(), Box<dyn std::error::Error>> {
    let (table, rows) = match dataset {
        Dataset::Ff3 => (
            FACTORS_FF3_MONTHLY,
            download_factors(db, FrenchDataset::Ff3Monthly, FACTORS_FF3_MONTHLY, sample).await?,
        ),
        Dataset::Ff5 => (
            FACTORS_FF5_MONTHLY,
            download_factors(db, FrenchDataset::Ff5Monthly, FACTORS_FF5_MONTHLY, sample).await?,
        ),
        Dataset::Ff3Daily => (
            FACTORS_FF3_DAILY,
            download_factors(db, FrenchDataset::Ff3Daily, FACTORS_FF3_DAILY, sample).await?,
        ),
        Dataset::Industries => (INDUSTRIES_FF_MONTHLY, download_industries(db, sample).await?),
        Dataset::Macro => (MACRO_PREDICTORS, download_macro_predictors(db, sample).await?),
        Dataset::Cpi => (CPI_MONTHLY, download_cpi(db, sample).await?),
        Dataset::Prices | Dataset::All => return Ok(()),
    };
    println!("Stored {rows} rows in {table}");
    Ok(())
}

async fn download_quotes(
    db: &Database,
    settings: &Settings,
    symbols: Vec<String>,
    refresh: bool,
    sample: &SamplePeriod,
) -> Result<(), Box<dyn std::error::Error>> {
    let symbols = if symbols.is_empty() {
        settings.download.symbols.clone()
    } else {
        symbols
    };
    let request = PriceRequest {
        symbols,
        concurrency: settings.download.concurrency,
        rate_limit: Duration::from_millis(settings.download.rate_limit_ms),
        refresh,
    };

    let pb = progress_bar(request.symbols.len() as u64)?;
    pb.set_message("fetching quotes");
    let summary = download_prices(db, request, sample, &pb).await;
    pb.finish_and_clear();
    let summary = summary?;

    println!(
        "Fetched {} symbols ({} already stored, {} failed), {} quote rows",
        summary.fetched,
        summary.cached,
        summary.failed.len(),
        summary.rows
    );
    if !summary.failed.is_empty() {
        println!("Failed: {}", summary.failed.join(", "));
    }
    Ok(())
}
