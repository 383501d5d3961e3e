use querysmith::config::{log_file_from_env, AppConfig, DatabaseConfig, LlmConfig, PipelineConfig};
use querysmith::db::{init_pool, ping};
use querysmith::llm::LlmClient;
use querysmith::observability::init_tracing;
use querysmith::schema::{SchemaContext, SqlDialect};
use querysmith::RetryController;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "querysmith")]
#[command(about = "Natural-language questions to SQL, with self-correction")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a natural-language question against the database
    Ask {
        /// The question in natural language
        query: String,

        /// Markdown/text file describing the schema (default: bundled demo schema)
        #[arg(short, long)]
        schema_file: Option<PathBuf>,

        /// Maximum number of repair cycles (or set MAX_RETRY)
        #[arg(long)]
        max_retry: Option<u32>,

        /// SQL dialect to generate (or set SQL_DIALECT)
        #[arg(long)]
        dialect: Option<SqlDialect>,

        /// Database URL (or set DATABASE_URL / mysql_* variables)
        #[arg(long)]
        database_url: Option<String>,

        /// Print the full run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the schema context handed to the agents
    Schema {
        #[arg(short, long)]
        schema_file: Option<PathBuf>,
    },
    /// Check database connectivity
    Ping {
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing(log_file_from_env().as_deref())?;

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            query,
            schema_file,
            max_retry,
            dialect,
            database_url,
            json,
        } => run_ask(query, schema_file, max_retry, dialect, database_url, json).await,
        Commands::Schema { schema_file } => {
            println!("{}", load_schema(schema_file)?);
            Ok(())
        }
        Commands::Ping { database_url } => run_ping(database_url).await,
    }
}

fn load_schema(schema_file: Option<PathBuf>) -> Result<SchemaContext> {
    Ok(match schema_file {
        Some(path) => SchemaContext::from_file(&path)?,
        None => SchemaContext::demo(),
    })
}

fn database_config(database_url: Option<String>) -> Result<DatabaseConfig> {
    Ok(match database_url {
        Some(url) => DatabaseConfig::with_url(url),
        None => DatabaseConfig::from_env()?,
    })
}

async fn run_ask(
    query: String,
    schema_file: Option<PathBuf>,
    max_retry: Option<u32>,
    dialect: Option<SqlDialect>,
    database_url: Option<String>,
    json: bool,
) -> Result<()> {
    let schema = load_schema(schema_file)?;

    let mut pipeline = PipelineConfig::from_env()?;
    if let Some(max_retry) = max_retry {
        pipeline.max_retry = max_retry;
    }
    if let Some(dialect) = dialect {
        pipeline.dialect = dialect;
    }

    let config = AppConfig {
        database: database_config(database_url)?,
        llm: LlmConfig::from_env()?,
        pipeline,
        log_file: log_file_from_env(),
    };

    let pool = init_pool(&config.database).await?;
    let llm = LlmClient::new(&config.llm)?;
    info!(model = llm.model(), backend = pool.backend_name(), "Pipeline ready");

    let pool = Arc::new(pool);
    let controller = RetryController::new(Arc::new(llm), pool.clone(), schema, config.pipeline);
    let record = controller.submit_query(&query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        match record.answer() {
            Ok((sql, table)) => {
                println!("\n{}\n", sql);
                println!("{}", table);
            }
            Err(e) => println!("{}", e),
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_ping(database_url: Option<String>) -> Result<()> {
    let config = database_config(database_url)?;
    let pool = init_pool(&config).await?;
    ping(&pool).await?;
    println!("{} database reachable", pool.backend_name());
    pool.close().await;
    Ok(())
}
