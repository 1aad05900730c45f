#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use vpnconv::cli::Args;
use vpnconv::config::ConverterConfig;
use vpnconv::convert::Converter;
use vpnconv::helpers::resolve_template;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading converter config from: {}", path);
            ConverterConfig::load(path).await?
        }
        None => ConverterConfig::default(),
    };

    let clash_template = args
        .clash_template
        .as_deref()
        .unwrap_or(&config.clash_template);
    let singbox_template = args
        .singbox_template
        .as_deref()
        .unwrap_or(&config.singbox_template);

    let converter = Converter::new(
        &config,
        resolve_template(clash_template).await?,
        resolve_template(singbox_template).await?,
    );

    if args.list {
        println!("schemes: {}", converter.schemes().join(", "));
        println!("formats: {}", converter.formats().join(", "));
        return Ok(());
    }

    let uri = args.uri.as_deref().context("A share link is required")?;
    let document = converter.convert(uri, &args.format)?;

    match args.output.as_deref() {
        Some(output) => {
            let extension = converter.file_extension(&args.format).unwrap_or("txt");
            let path = output_path(Path::new(output), extension).await;
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
            tokio::fs::write(&path, document)
                .await
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            tracing::info!("Wrote {} config to {}", args.format, path.display());
        }
        None => print!("{}", document),
    }

    Ok(())
}

/// Resolves `-o`: a directory (existing, or spelled with a trailing
/// separator) receives `config.<ext>`, anything else is used as the file
async fn output_path(output: &Path, extension: &str) -> PathBuf {
    let is_dir = tokio::fs::metadata(output)
        .await
        .is_ok_and(|m| m.is_dir())
        || output.to_string_lossy().ends_with(std::path::MAIN_SEPARATOR);
    if is_dir {
        output.join(format!("config.{}", extension))
    } else {
        output.to_path_buf()
    }
}
