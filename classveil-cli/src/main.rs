mod app;
mod output;

use std::{str::FromStr, time::Instant};

use anyhow::Context;
use clap::Parser;
use classveil::{naming::NamingStrategy, obfuscate::PassKind, Obfuscator, ObfuscatorConfig};

use crate::app::Cli;

fn build_config(cli: &Cli) -> anyhow::Result<ObfuscatorConfig> {
    let mut config = ObfuscatorConfig::new()
        .with_target_package(cli.package.clone())
        .with_platform_library(!cli.no_platform)
        .with_strict_hierarchy(!cli.lenient);

    for class in &cli.keep {
        config = config.with_kept_class(class.clone());
    }
    for path in &cli.library {
        config = config.with_library(path.clone());
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(length) = cli.cfn {
        anyhow::ensure!(length > 0, "--cfn needs a positive length");
        config = config.with_naming(NamingStrategy::Opaque { length });
    }
    if !cli.passes.is_empty() {
        let passes = cli
            .passes
            .iter()
            .map(|name| {
                PassKind::from_str(name.trim())
                    .with_context(|| format!("unknown pass '{name}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        config = config.with_passes(passes);
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // classveil info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("classveil", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let config = build_config(&cli)?;
    let started = Instant::now();
    let mut obfuscator = Obfuscator::new(config);
    let report = obfuscator
        .run(&cli.source, &cli.destination)
        .with_context(|| {
            format!(
                "failed to obfuscate {} into {}",
                cli.source.display(),
                cli.destination.display()
            )
        })?;

    output::print_report(
        &report,
        &cli.source.display().to_string(),
        &cli.destination.display().to_string(),
        started.elapsed().as_millis(),
        cli.json,
    )
}
