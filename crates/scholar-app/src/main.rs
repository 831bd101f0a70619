//! Scholar application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialise tracing
//! 3. Build the encoder and the recommendation facade
//! 4. Run the selected subcommand: `serve`, `query` or `build`

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use scholar_api::{auth, routes};
use scholar_api::state::AppState;
use scholar_core::config::ScholarConfig;
use scholar_core::error::ScholarError;
use scholar_core::types::{Category, ResultRecord};
use scholar_vector::{
    embedder_from_config, load_corpus, QueryEncoder, Recommender, StoreBuilder, StorePaths,
};

use cli::{BuildArgs, CliArgs, Command, QueryArgs};

/// Characters of matched text shown per result in the terminal.
const SNIPPET_CHARS: usize = 500;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_recommender(config: &ScholarConfig) -> Result<Arc<Recommender>, ScholarError> {
    let embedder = embedder_from_config(&config.encoder)?;
    Ok(Arc::new(Recommender::new(
        QueryEncoder::new(embedder),
        config.recommend.clone(),
    )))
}

async fn serve(mut config: ScholarConfig, config_file: &Path) -> Result<(), ScholarError> {
    let token_file = config
        .server
        .admin_token_file
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config_file.with_file_name("admin_token"));
    let token = auth::resolve_admin_token(config.server.admin_token.as_deref(), &token_file)?;
    config.server.admin_token = Some(token);

    let recommender = build_recommender(&config)?;
    let paths = StorePaths::from_config(&config.store);

    // Keep serving without a store; /admin/reload can recover.
    if let Err(e) = recommender.load(&paths).await {
        error!(
            error = %e,
            store = %paths.dir.display(),
            "Initial store load failed; /recommend returns 503 until a reload succeeds"
        );
    }

    let state = AppState::new(config, recommender);
    routes::start_server(state).await
}

async fn query(config: ScholarConfig, args: QueryArgs) -> Result<(), ScholarError> {
    let category = Category::parse_filter(args.category.as_deref())?;
    let recommender = build_recommender(&config)?;
    recommender
        .load(&StorePaths::from_config(&config.store))
        .await?;

    if let Some(text) = args.text {
        let results = recommender.recommend(&text, args.top_k, category).await?;
        print_results(&results);
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"\nquery> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match recommender.recommend(line, args.top_k, category).await {
            Ok(results) => print_results(&results),
            Err(e) if e.is_client_error() => println!("{}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn build(config: ScholarConfig, args: BuildArgs) -> Result<(), ScholarError> {
    let corpus = load_corpus(&args.corpus)?;
    let embedder = embedder_from_config(&config.encoder)?;
    let (store, report) = StoreBuilder::new(embedder).build(&corpus).await?;

    let files = store.save(&StorePaths::from_config(&config.store))?;

    println!(
        "Embedded {} records ({} skipped with empty text) into {}",
        report.embedded,
        report.skipped_empty,
        files.embeddings.display()
    );
    Ok(())
}

fn print_results(results: &[ResultRecord]) {
    if results.is_empty() {
        println!("No matching faculty found.");
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        let category = if result.category == Category::Unclassified {
            "unclassified"
        } else {
            result.category.as_str()
        };
        println!(
            "\n{}. {} [{}] score {:.4}",
            rank + 1,
            result.name,
            category,
            result.similarity_score
        );
        if let Some(ref email) = result.email {
            println!("   {}", email);
        }
        if let Some(ref link) = result.profile_link {
            println!("   {}", link);
        }
        let snippet: String = result.matched_text.chars().take(SNIPPET_CHARS).collect();
        println!("   {}", snippet);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Read the config before tracing so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ScholarConfig::load(&config_file))
    } else {
        None
    };

    let level = args
        .log_level
        .clone()
        .or_else(|| match &loaded {
            Some(Ok(config)) => Some(config.general.log_level.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&level);

    info!("Starting Scholar v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Some(Ok(config)) => {
            info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Some(Err(e)) => {
            warn!(path = %config_file.display(), error = %e, "Invalid configuration; using defaults");
            ScholarConfig::default()
        }
        None => {
            info!(path = %config_file.display(), "No configuration file; using defaults");
            ScholarConfig::default()
        }
    };
    args.apply_overrides(&mut config);

    let result = match args.command() {
        Command::Serve(_) => serve(config, &config_file).await,
        Command::Query(query_args) => query(config, query_args).await,
        Command::Build(build_args) => build(config, build_args).await,
    };

    if let Err(ref e) = result {
        error!(error = %e, "Scholar exited with an error");
    }
    Ok(result?)
}
