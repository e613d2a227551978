// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! auto-feedback: essay feedback from a local quantized language model

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use auto_feedback::config::{AppConfig, Backend};
use auto_feedback::feedback::SAMPLE_ESSAY;
use auto_feedback::llm::ollama::OllamaClient;
use auto_feedback::llm::build_generator;
use auto_feedback::scaffold::ProjectManifest;
use auto_feedback::{FeedbackAgent, FeedbackError, Result};

/// auto-feedback CLI - essay feedback from a local GGUF model
#[derive(Parser, Debug)]
#[command(name = "auto-feedback")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Essay feedback from a local quantized language model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "feedback.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate feedback for an essay
    Feedback {
        /// Essay file (reads stdin when neither a file nor --text is given)
        essay: Option<PathBuf>,

        /// Essay text passed inline
        #[arg(long, conflicts_with = "essay")]
        text: Option<String>,

        /// Use the built-in sample essay
        #[arg(long, conflicts_with_all = ["essay", "text"])]
        sample: bool,

        /// Override the inference backend (gguf or ollama)
        #[arg(long)]
        backend: Option<String>,
    },

    /// Create the auto-feedback project folder tree
    Scaffold {
        /// Directory to create (overrides config)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Show what would be written without touching the disk
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show inference backend status
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show effective configuration (file plus environment)
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "feedback.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

impl Commands {
    /// Whether the command runs or reports on the model
    fn uses_model(&self) -> bool {
        !matches!(
            self,
            Commands::Scaffold { .. }
                | Commands::Config { action: ConfigCommands::Generate { .. } }
        )
    }
}

/// Load the config file and overlay the environment
///
/// A malformed model variable only matters to commands that use the model;
/// the rest log it and carry on.
fn load_config<F>(cli: &Cli, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AppConfig::load(&cli.config)?;
    if let Err(e) = config.apply_env(lookup) {
        if cli.command.uses_model() {
            return Err(e);
        }
        warn!("Ignoring environment overrides: {}", e);
    }
    Ok(config)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli, |key| std::env::var(key).ok())?;

    // The compute pool reads this once, so it must be set before any worker starts
    if std::env::var_os("RAYON_NUM_THREADS").is_none() {
        std::env::set_var("RAYON_NUM_THREADS", config.model.threads.to_string());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Commands::Feedback { essay, text, sample, backend } => {
            run_feedback(config, essay, text, sample, backend, &cli.format).await
        }
        Commands::Scaffold { root, dry_run } => run_scaffold(&config, root, dry_run, cli.quiet),
        Commands::Config { action } => {
            run_config_command(config, action, &cli.config, &cli.format)
        }
        Commands::Status => run_status(config, &cli.format).await,
    }
}

/// Resolve the essay from file, inline text, sample, or stdin
fn read_essay(essay: Option<PathBuf>, text: Option<String>, sample: bool) -> Result<String> {
    if sample {
        return Ok(SAMPLE_ESSAY.to_string());
    }
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = essay {
        debug!("Reading essay from {:?}", path);
        return Ok(std::fs::read_to_string(path)?);
    }

    debug!("Reading essay from stdin");
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

async fn run_feedback(
    mut config: AppConfig,
    essay: Option<PathBuf>,
    text: Option<String>,
    sample: bool,
    backend: Option<String>,
    format: &str,
) -> Result<()> {
    if let Some(backend) = backend {
        config.engine.backend = backend.parse()?;
    }
    config.validate()?;

    let essay = read_essay(essay, text, sample)?;

    let generator = build_generator(&config)?;
    let agent = FeedbackAgent::new(generator, config.generation.clone());
    info!("Using backend: {}", agent.backend());

    let feedback = agent.generate_feedback(&essay).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&feedback)?),
        _ => print!("{}", feedback),
    }

    Ok(())
}

fn run_scaffold(config: &AppConfig, root: Option<PathBuf>, dry_run: bool, quiet: bool) -> Result<()> {
    let root = root.unwrap_or_else(|| config.scaffold.root.clone());
    let manifest = ProjectManifest::auto_feedback_agent();

    if dry_run {
        manifest.validate()?;
        for path in manifest.plan(&root) {
            println!("Would create: {}", path.display());
        }
        return Ok(());
    }

    let report = manifest.scaffold(&root)?;

    if !quiet {
        println!("Project scaffolded in {:?}", report.root);
        println!("  Directories: {}", report.directories);
        println!("  Files written: {}", report.files_written);
        if report.files_overwritten > 0 {
            println!("  Overwritten: {}", report.files_overwritten);
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(
    config: AppConfig,
    action: ConfigCommands,
    config_path: &Path,
    format: &str,
) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                return Err(FeedbackError::Config(format!(
                    "{:?} already exists. Use --force to overwrite",
                    output
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            let summary = validation_summary(&config, config_path);
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                _ => {
                    println!("Configuration at {:?} is valid", config_path);
                    println!("  Backend: {}", config.engine.backend);
                    println!("  Model: {}", config.model.resolved_path().display());
                    println!("  Threads: {}", config.model.threads);
                    println!("  GPU layers: {}", config.model.gpu_layers);
                }
            }
        }
    }

    Ok(())
}

fn validation_summary(config: &AppConfig, config_path: &Path) -> serde_json::Value {
    serde_json::json!({
        "config": config_path.to_string_lossy(),
        "valid": true,
        "backend": config.engine.backend.to_string(),
        "model": config.model.resolved_path().to_string_lossy(),
        "threads": config.model.threads,
        "gpu_layers": config.model.gpu_layers,
    })
}

/// Collect backend status
async fn status_report(config: &AppConfig) -> Result<serde_json::Value> {
    let mut report = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "backend": config.engine.backend.to_string(),
    });

    match config.engine.backend {
        Backend::Gguf => {
            let model = config.model.resolved_path();
            let tokenizer = config.model.resolved_tokenizer();
            report["model"] = serde_json::json!({
                "path": model.to_string_lossy(),
                "present": model.exists(),
            });
            report["tokenizer"] = serde_json::json!({
                "path": tokenizer.to_string_lossy(),
                "present": tokenizer.exists(),
            });
            report["threads"] = config.model.threads.into();
            report["gpu_layers"] = config.model.gpu_layers.into();
        }
        Backend::Ollama => {
            let client = OllamaClient::new(
                &config.engine.ollama_url,
                &config.engine.ollama_model,
                &config.model,
                config.engine.timeout_secs,
            )?;

            let running = client.health_check().await;
            report["ollama"] = serde_json::json!({
                "url": client.base_url(),
                "running": running.is_ok(),
                "error": running.err().map(|e| e.to_string()),
                "model": client.model(),
            });
            report["models"] = match client.list_models().await {
                Ok(models) => models.into(),
                Err(e) => {
                    debug!("Error listing models: {}", e);
                    serde_json::Value::Array(Vec::new())
                }
            };
        }
    }

    let generator = build_generator(config)?;
    match generator.check().await {
        Ok(()) => report["ready"] = true.into(),
        Err(e) => {
            warn!("Backend not ready: {}", e);
            report["ready"] = false.into();
            report["not_ready_reason"] = e.to_string().into();
        }
    }

    Ok(report)
}

/// Run status check
async fn run_status(config: AppConfig, format: &str) -> Result<()> {
    let report = status_report(&config).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let yes_no = |v: &serde_json::Value| if v.as_bool() == Some(true) { "yes" } else { "no" };

    println!("auto-feedback v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");
    println!("Backend: {}", config.engine.backend);

    match config.engine.backend {
        Backend::Gguf => {
            println!("\nModel: {}", report["model"]["path"].as_str().unwrap_or(""));
            println!("  Present: {}", yes_no(&report["model"]["present"]));
            println!("Tokenizer: {}", report["tokenizer"]["path"].as_str().unwrap_or(""));
            println!("  Present: {}", yes_no(&report["tokenizer"]["present"]));
            println!("Threads: {}", config.model.threads);
            println!("GPU layers: {}", config.model.gpu_layers);
        }
        Backend::Ollama => {
            let ollama = &report["ollama"];
            match ollama["error"].as_str() {
                None => println!("\nOllama ({}): Running", ollama["url"].as_str().unwrap_or("")),
                Some(e) => println!("\nOllama: Error - {}", e),
            }

            println!("\nAvailable models:");
            let wanted = ollama["model"].as_str().unwrap_or("");
            for m in report["models"].as_array().into_iter().flatten() {
                let m = m.as_str().unwrap_or("");
                let marker = if m.starts_with(wanted) { "→" } else { " " };
                println!("  {} {}", marker, m);
            }
        }
    }

    match report["not_ready_reason"].as_str() {
        None => println!("\nReady"),
        Some(reason) => println!("\nNot ready: {}", reason),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_feedback_file() {
        let cli = Cli::try_parse_from(["auto-feedback", "feedback", "essay.txt"]).unwrap();

        match cli.command {
            Commands::Feedback { essay, text, sample, .. } => {
                assert_eq!(essay, Some(PathBuf::from("essay.txt")));
                assert!(text.is_none());
                assert!(!sample);
            }
            _ => panic!("Expected Feedback command"),
        }
    }

    #[test]
    fn test_cli_feedback_conflicts() {
        let result = Cli::try_parse_from([
            "auto-feedback", "feedback", "essay.txt", "--text", "inline"
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_scaffold_command() {
        let cli = Cli::try_parse_from([
            "auto-feedback", "scaffold", "--root", "/tmp/proj", "--dry-run"
        ]).unwrap();

        match cli.command {
            Commands::Scaffold { root, dry_run } => {
                assert!(dry_run);
                assert_eq!(root, Some(PathBuf::from("/tmp/proj")));
            }
            _ => panic!("Expected Scaffold command"),
        }
    }

    #[test]
    fn test_cli_global_format() {
        let cli = Cli::try_parse_from(["auto-feedback", "status", "--format", "json"]).unwrap();
        assert_eq!(cli.format, "json");
        assert!(Cli::try_parse_from(["auto-feedback", "status", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_read_essay_sources() {
        assert_eq!(read_essay(None, None, true).unwrap(), SAMPLE_ESSAY);
        assert_eq!(read_essay(None, Some("inline".into()), false).unwrap(), "inline");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("essay.txt");
        std::fs::write(&path, "from file").unwrap();
        assert_eq!(read_essay(Some(path), None, false).unwrap(), "from file");
    }

    #[test]
    fn test_bad_model_env_does_not_block_scaffold() {
        let lookup = |key: &str| (key == "LLAMA_GPU_LAYERS").then(|| "lots".to_string());

        let scaffold = Cli::try_parse_from(["auto-feedback", "scaffold"]).unwrap();
        assert!(load_config(&scaffold, lookup).is_ok());

        let generate = Cli::try_parse_from(["auto-feedback", "config", "generate"]).unwrap();
        assert!(load_config(&generate, lookup).is_ok());

        let feedback = Cli::try_parse_from(["auto-feedback", "feedback", "--sample"]).unwrap();
        assert!(matches!(load_config(&feedback, lookup), Err(FeedbackError::Config(_))));
    }

    #[test]
    fn test_all_gpu_layers_env_is_accepted() {
        let lookup = |key: &str| (key == "LLAMA_GPU_LAYERS").then(|| "-1".to_string());
        let cli = Cli::try_parse_from(["auto-feedback", "status"]).unwrap();
        assert_eq!(load_config(&cli, lookup).unwrap().model.gpu_layers, -1);
    }

    #[tokio::test]
    async fn test_status_report_for_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.model.path = dir.path().join("absent.gguf");

        let report = status_report(&config).await.unwrap();
        assert_eq!(report["backend"], "gguf");
        assert_eq!(report["model"]["present"], false);
        assert_eq!(report["ready"], false);
        assert!(report["not_ready_reason"].as_str().unwrap().contains("Model not found"));
    }

    #[test]
    fn test_validation_summary_fields() {
        let mut config = AppConfig::default();
        config.model.gpu_layers = -1;
        let summary = validation_summary(&config, Path::new("feedback.json"));
        assert_eq!(summary["valid"], true);
        assert_eq!(summary["backend"], "gguf");
        assert_eq!(summary["gpu_layers"], -1);
        assert_eq!(summary["config"], "feedback.json");
    }

    #[test]
    fn test_scaffold_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        run_scaffold(&AppConfig::default(), Some(root.clone()), true, true).unwrap();
        assert!(!root.exists());
    }
}
