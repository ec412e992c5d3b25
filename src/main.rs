use anyhow::{Context, Result};
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use clap::{Parser, Subcommand};
use ollama_rs::Ollama;
use prettytable::{format, row, Table};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use coursefinder::api::{self, AppState};
use coursefinder::config::RecommenderConfig;
use coursefinder::db::Database;
use coursefinder::decomposer::LlmDecomposer;
use coursefinder::environment::{get_env_string, get_env_var_or};
use coursefinder::logging::configure_logging;
use coursefinder::recommender::Recommender;
use coursefinder::types::{CourseDump, RecommendationOutput};
use coursefinder::vector::{OllamaEmbedder, QdrantSentenceIndex, QDRANT_URL_ENV};
use coursefinder::{LLMClient, LLMParams};

#[derive(Parser)]
#[clap(name = "coursefinder", about = "Recommend courses from a free-text request")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend courses for one request
    Recommend {
        /// What you are looking for, in your own words
        #[clap(required = true)]
        query: String,

        /// Number of courses considered in each pass
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the full result as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Load courses, reviews and review stats from a JSON file into the course database
    Import {
        /// JSON file with `courses`, `reviews` and `review_stats` arrays
        path: PathBuf,
    },

    /// Serve recommendations over HTTP
    Serve {
        /// Port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Recommend { query, top_k, json } => {
            let recommender = build_recommender(top_k).await?;
            let output = recommender.recommend(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_output(&output);
            }
        }
        Commands::Import { path } => {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let dump: CourseDump = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?;

            let database_path = get_env_string("DATABASE_PATH", "courses.db");
            let db = Database::create(&database_path)
                .await
                .with_context(|| format!("Failed to open course database {}", database_path))?;
            db.import(&dump).await?;
            println!(
                "{} now holds {} courses",
                database_path,
                db.count_courses().await?
            );
        }
        Commands::Serve { port } => {
            let recommender = build_recommender(None).await?;
            api::serve(AppState::new(Arc::new(recommender)), port).await?;
        }
    }

    Ok(())
}

fn ollama_client() -> Ollama {
    let host = get_env_string("OLLAMA_HOST", "http://localhost");
    let port: u16 = get_env_var_or("OLLAMA_PORT", 11434);
    info!("Connecting to Ollama at {}:{}", host, port);
    Ollama::new(host, port)
}

fn llm_params() -> Result<LLMParams> {
    let provider = get_env_string("LLM_PROVIDER", "ollama");
    let (llm_client, default_model) = match provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set when LLM_PROVIDER=openai")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            (
                LLMClient::OpenAI(OpenAIClient::with_config(config)),
                "gpt-3.5-turbo",
            )
        }
        "ollama" => (LLMClient::Ollama(ollama_client()), "llama3"),
        other => anyhow::bail!("Unknown LLM_PROVIDER {:?}, expected ollama or openai", other),
    };

    Ok(LLMParams {
        llm_client,
        model: get_env_string("LLM_MODEL", default_model),
        temperature: get_env_var_or("LLM_TEMPERATURE", 0.0),
        timeout_secs: get_env_var_or("LLM_TIMEOUT_SECS", 60),
        max_attempts: get_env_var_or("LLM_MAX_ATTEMPTS", 1),
    })
}

async fn build_recommender(top_k: Option<usize>) -> Result<Recommender> {
    let mut config = RecommenderConfig::from_env();
    if let Some(top_k) = top_k {
        config = config.with_top_k(top_k);
    }
    config.validate()?;

    let qdrant_url = std::env::var(QDRANT_URL_ENV)
        .with_context(|| format!("{} must be set", QDRANT_URL_ENV))?;
    let qdrant_timeout = Duration::from_secs(get_env_var_or("QDRANT_TIMEOUT_SECS", 10));
    let embedder = Arc::new(OllamaEmbedder::new(
        ollama_client(),
        get_env_string("EMBEDDING_MODEL", "bge-m3"),
        Duration::from_secs(get_env_var_or("EMBEDDING_TIMEOUT_SECS", 30)),
    ));

    let course_index = QdrantSentenceIndex::connect(
        &qdrant_url,
        get_env_string("COURSE_SENTENCE_COLLECTION", "course_sentence"),
        embedder.clone(),
        qdrant_timeout,
    )?;
    let review_index = QdrantSentenceIndex::connect(
        &qdrant_url,
        get_env_string("REVIEW_SENTENCE_COLLECTION", "review_sentence"),
        embedder,
        qdrant_timeout,
    )?;

    let database_path = get_env_string("DATABASE_PATH", "courses.db");
    let db = Database::new(&database_path)
        .await
        .with_context(|| format!("Failed to open course database {}", database_path))?;
    info!("Course database holds {} courses", db.count_courses().await?);

    Ok(Recommender::new(
        Arc::new(LlmDecomposer::new(llm_params()?)),
        Arc::new(course_index),
        Arc::new(review_index),
        Arc::new(db),
    )
    .with_config(config))
}

fn print_output(output: &RecommendationOutput) {
    println!("Content sub-queries:");
    for sub_query in &output.decomposition.content {
        println!("  - {}", sub_query.text());
    }
    println!("Evaluation sub-queries:");
    for sub_query in &output.decomposition.evaluation {
        println!("  - {}", sub_query.text());
    }
    println!();

    if output.recommendations.is_empty() {
        println!("No matching courses found.");
    } else {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(row![
            "Rank", "Score", "Content", "Evaluation", "Course", "No.", "Instructor", "Reviews"
        ]);
        for (rank, recommendation) in output.recommendations.iter().enumerate() {
            let course = &recommendation.course;
            table.add_row(row![
                rank + 1,
                format!("{:.3}", recommendation.score),
                format!("{:.3}", recommendation.content_score),
                format!("{:.3}", recommendation.evaluation_score),
                course.course_name,
                format!("{}-{}", course.course_no, course.course_class),
                course.instructor,
                recommendation.reviews.len()
            ]);
        }
        table.printstd();

        for recommendation in &output.recommendations {
            println!("\n{} ({})", recommendation.course.course_name, recommendation.course.instructor);
            for line in recommendation.document.lines() {
                println!("  | {}", line);
            }
            for review in &recommendation.reviews {
                println!("  > {}", review.text.replace('\n', " "));
            }
        }
    }

    if !output.integrity_issues.is_empty() {
        println!("\n{} evidence records could not be resolved:", output.integrity_issues.len());
        for issue in &output.integrity_issues {
            println!("  - {}", issue);
        }
    }
}
