use clap::{Parser, Subcommand};
use log::info;
use screener::{
    commands::{explain, keywords, respond, search, sectors, serve},
    config::DashboardSettings,
    context::AppContext,
    models::{ExplanationCategory, KeywordColumn, Timeframe},
    pipeline::SearchRequest,
};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "screener")]
#[command(about = "Sector harm screener and stock dashboard")]
struct Cli {
    /// Path to the SQLite reference store (overrides SCREENER_DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web dashboard
    Serve {
        /// Address to listen on (overrides SCREENER_BIND_ADDR)
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
    /// Run one search and print a summary
    Search {
        #[arg(long)]
        ticker: String,
        /// Sector name or fragment
        #[arg(long)]
        sector: String,
        #[arg(long, value_parser = Timeframe::parse, default_value = "1M")]
        timeframe: Timeframe,
        /// Subindustry keyword
        #[arg(long)]
        keyword1: Option<String>,
        /// Social justice screen keyword
        #[arg(long)]
        keyword2: Option<String>,
        /// Also write the PDF report to this path
        #[arg(long, value_name = "PATH")]
        pdf: Option<PathBuf>,
    },
    /// List distinct sectors in the reference store
    Sectors,
    /// List distinct keyword values (subindustry or screen)
    Keywords {
        #[arg(value_parser = KeywordColumn::parse)]
        column: KeywordColumn,
    },
    /// Explain a scoring code
    Explain {
        #[arg(value_parser = ExplanationCategory::parse)]
        category: ExplanationCategory,
        code: i64,
    },
    /// Look up the response for a subindustry and screen pair
    Respond { keyword1: String, keyword2: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { database, command } = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = DashboardSettings::from_env(database)?;
    let app_context = AppContext::initialize(settings)?;

    info!("Starting screener. Informational only, not financial advice.");

    match command {
        Commands::Serve { bind } => {
            serve::run(&app_context, bind).await?;
        }
        Commands::Search {
            ticker,
            sector,
            timeframe,
            keyword1,
            keyword2,
            pdf,
        } => {
            let request = SearchRequest {
                ticker,
                sector,
                timeframe: timeframe.label().to_string(),
                keyword1,
                keyword2,
            };
            search::run(&app_context, &request, pdf.as_deref()).await?;
        }
        Commands::Sectors => {
            sectors::run(&app_context).await?;
        }
        Commands::Keywords { column } => {
            keywords::run(&app_context, column).await?;
        }
        Commands::Explain { category, code } => {
            explain::run(&app_context, category, code).await?;
        }
        Commands::Respond { keyword1, keyword2 } => {
            respond::run(&app_context, &keyword1, &keyword2).await?;
        }
    }

    Ok(())
}
