mod cli;

use msb::replay::{self, Script};
use msb_core::StreamConfig;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "msb=debug,msb_stream=trace,msb_core=debug".to_string()
        } else {
            "msb=info,msb_stream=warn,msb_core=warn".to_string()
        }
    });

    // Logs go to stderr so reports on stdout stay machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay { script, json } => replay_script(&script, cli.config.as_deref(), json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("msb {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn replay_script(path: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Script file does not exist: {:?}", path);
    }

    let settings = StreamConfig::load_or_default(config_path);
    let script = Script::from_path(path)
        .with_context(|| format!("Failed to load script {}", path.display()))?;

    tracing::info!(
        "Replaying {} step(s) against a {} stream",
        script.steps.len(),
        script.stream
    );
    let report = replay::run(&script, &settings);

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        print!("{report}");
    }

    let failed = report.failed_steps();
    if failed > 0 {
        anyhow::bail!("{failed} step(s) failed");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            StreamConfig::from_path(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            StreamConfig::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    println!("  Audio memory limit: {} bytes", config.audio_memory_limit);
    println!("  Video memory limit: {} bytes", config.video_memory_limit);
    println!("  Text memory limit: {} bytes", config.text_memory_limit);
    println!(
        "  Splice frames: {}",
        if config.splice_frames_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    Ok(())
}
