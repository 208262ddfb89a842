//! faqbuddy - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use faqbuddy::{
    cli::{output, Args, Commands, ConfigCommand, Verbosity},
    telemetry, Config, KnowledgeOrchestrator, Query,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init must work before any config file exists
    if let Commands::Config {
        action: ConfigCommand::Init { force },
    } = &args.command
    {
        return init_config(&args, *force);
    }

    let config = Config::load(args.config.clone()).context("failed to load configuration")?;

    let verbosity = if args.quiet || args.verbose > 0 {
        args.verbosity()
    } else {
        Verbosity::from_config(&config.logging.default_verbosity)
    };
    if !config.logging.color_output {
        colored::control::set_override(false);
    }
    telemetry::init_logging(verbosity.filter_directive(), config.logging.color_output);

    match &args.command {
        Commands::Ask {
            question,
            locale,
            product,
            json,
        } => {
            let mut query = Query::new(question.as_str()).with_locale(locale.as_str());
            if let Some(product) = product {
                query = query.with_product_hint(product.as_str());
            }
            ask(&config, query, verbosity, *json).await?;
        }
        Commands::Config { action } => match action {
            ConfigCommand::Show => show_config(&args, &config)?,
            ConfigCommand::Init { force } => init_config(&args, *force)?,
        },
    }

    Ok(())
}

async fn ask(config: &Config, query: Query, verbosity: Verbosity, json: bool) -> Result<()> {
    let orchestrator =
        KnowledgeOrchestrator::from_config(config).context("failed to initialize the knowledge pipeline")?;

    if !orchestrator.web_search_enabled() {
        tracing::debug!("web search fallback disabled (no API key configured)");
    }

    let response = orchestrator.answer(query).await;
    output::print_response(&response, verbosity, json)?;
    Ok(())
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if shown.services.web_search_api_key.is_some() {
        shown.services.web_search_api_key = Some("********".to_string());
    }
    let text = toml::to_string_pretty(&shown).context("failed to serialize configuration")?;

    match args.config.clone().or_else(Config::default_path) {
        Some(path) if path.exists() => println!("{} {}\n", "# Loaded from".dimmed(), path.display()),
        _ => println!("{}\n", "# Built-in defaults".dimmed()),
    }
    println!("{}", text);
    Ok(())
}

fn init_config(args: &Args, force: bool) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path().context("could not determine home directory")?,
    };

    if path.exists() && !force {
        eprintln!(
            "{}: {} already exists (use --force to overwrite)",
            "Warning".yellow(),
            path.display()
        );
        return Ok(());
    }

    Config::default().save(&path)?;
    println!("{} {}", "Wrote default configuration to".green(), path.display());
    Ok(())
}
