use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use futures::future;

pub use config::*;
pub use document::*;
pub use error::*;
pub use exporter::*;
pub use mount::*;
pub use normalize::{normalize, ViewBox};
pub use pipeline::*;
pub use scene::*;

mod config;
mod document;
mod error;
mod exporter;
mod mount;
pub mod normalize;
mod pipeline;
mod scene;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Preview configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the rendered HTML here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Class applied to each preview container
    #[arg(long, global = true)]
    root_class_name: Option<String>,

    /// Class applied to each <svg>
    #[arg(long, global = true)]
    class_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export Excalidraw scenes and render them as HTML previews
    Render {
        #[arg(required = true)]
        scenes: Vec<PathBuf>,

        /// Exporter program, overrides the config file
        #[arg(long)]
        exporter: Option<String>,

        /// Argument for the exporter program, may be repeated
        #[arg(long = "exporter-arg", allow_hyphen_values = true)]
        exporter_args: Vec<String>,
    },
    /// Render an SVG that was already exported as an HTML preview
    ///
    /// The file is treated as trusted exporter output and is injected into the page without any
    /// sanitization. Only pass SVGs produced by an Excalidraw exporter.
    Normalize { svg: PathBuf },
}

pub fn run() {
    env_logger::init_from_env(Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli) {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn handle_command(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        output,
        root_class_name,
        class_name,
        command,
    } = cli;

    tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?
        .block_on(async move {
            let mut config = match config_path {
                Some(path) => PreviewConfig::load(&path).await?,
                None => PreviewConfig::default(),
            };
            if root_class_name.is_some() {
                config.preview.root_class_name = root_class_name;
            }
            if class_name.is_some() {
                config.preview.class_name = class_name;
            }

            let containers = match command {
                Commands::Render {
                    scenes,
                    exporter,
                    exporter_args,
                } => {
                    if exporter.is_some() {
                        config.exporter_command = exporter;
                    }
                    if !exporter_args.is_empty() {
                        config.exporter_arguments = exporter_args;
                    }
                    let exporter = config.exporter()?;

                    future::join_all(
                        scenes
                            .iter()
                            .map(|path| render_scene(path, &exporter, &config)),
                    )
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()?
                }
                Commands::Normalize { svg } => vec![render_exported_svg(&svg, &config).await?],
            };

            write_output(output.as_deref(), &containers).await
        })
}

async fn render_scene(
    path: &Path,
    exporter: &CommandExporter,
    config: &PreviewConfig,
) -> Result<HtmlContainer> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read scene {path:?}"))?;
    let input = Scene::from_json(&source)
        .with_context(|| format!("Invalid scene {path:?}"))?
        .into_input(config.display_state.as_ref());

    let preview = Preview::new(exporter.clone(), config.preview.clone());
    match preview
        .update(input)
        .await
        .with_context(|| format!("Failed to render {path:?}"))?
    {
        UpdateOutcome::Skipped => log::warn!("{path:?} has no display state, nothing was exported"),
        _ => log::info!("Rendered {path:?}"),
    }

    mount(&preview)
}

async fn render_exported_svg(path: &Path, config: &PreviewConfig) -> Result<HtmlContainer> {
    let preview = Preview::new(FileExporter::new(path), config.preview.clone());
    let input = PreviewInput::new(
        ElementSet::default(),
        Some(config.display_state.clone().unwrap_or_default()),
    );

    preview
        .update(input)
        .await
        .with_context(|| format!("Failed to normalize {path:?}"))?;

    mount(&preview)
}

fn mount<E: VectorExporter>(preview: &Preview<E>) -> Result<HtmlContainer> {
    let mut view = PreviewView::new(HtmlContainer::new(), preview.options());
    view.render(&preview.state())?;

    Ok(view.into_target())
}

async fn write_output(output: Option<&Path>, containers: &[HtmlContainer]) -> Result<()> {
    let html = containers
        .iter()
        .map(HtmlContainer::to_html)
        .collect::<Vec<_>>()
        .join("\n");

    match output {
        Some(path) => {
            log::info!("Writing {} previews to {:?}", containers.len(), path);
            tokio::fs::write(path, html)
                .await
                .with_context(|| format!("Failed to write {path:?}"))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}
