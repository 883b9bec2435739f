use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use toml::{Table, Value};

use crate::exporter::CommandExporter;
use crate::scene::DisplayState;

const EXPORTER_SECTION: &str = "exporter";
const PREVIEW_SECTION: &str = "preview";
const DISPLAY_STATE_SECTION: &str = "display-state";

/// The image types a preview can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Vector,
    /// Accepted for compatibility, previews are always rendered as vectors
    Raster,
}

impl FromStr for ImageFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "svg" | "vector" => Ok(ImageFormat::Vector),
            "canvas" | "raster" => Ok(ImageFormat::Raster),
            other => Err(anyhow!(
                "image-format option must be one of \"svg\" or \"canvas\", found {other:?}"
            )),
        }
    }
}

/// How a single preview is rendered and mounted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewOptions {
    /// Pixel size hints. Vector previews always fill their container so these are currently unused.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub image_format: ImageFormat,
    /// class applied to the `<svg>` element
    pub class_name: Option<String>,
    /// class applied to the container the image is mounted in
    pub root_class_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewConfig {
    pub exporter_command: Option<String>,
    pub exporter_arguments: Vec<String>,
    pub preview: PreviewOptions,
    /// Layered over the display state saved with each scene
    pub display_state: Option<DisplayState>,
}

impl PreviewConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {path:?}"))?;

        Self::from_toml_str(&source).with_context(|| format!("Invalid config {path:?}"))
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table = source.parse::<Table>()?;

        Self::from_table(&table)
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let mut config = PreviewConfig::default();

        for key in table.keys() {
            if ![EXPORTER_SECTION, PREVIEW_SECTION, DISPLAY_STATE_SECTION].contains(&key.as_str()) {
                log::warn!("Ignoring unknown config section {key:?}");
            }
        }

        if let Some(exporter) = section(table, EXPORTER_SECTION)? {
            if let Some(value) = exporter.get("command") {
                config.exporter_command = Some(
                    value
                        .as_str()
                        .ok_or_else(|| anyhow!("command option is required to be a string"))?
                        .to_string(),
                );
            }

            if let Some(value) = exporter.get("arguments") {
                config.exporter_arguments = value
                    .as_array()
                    .ok_or_else(|| anyhow!("arguments option is required to be an array"))?
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or_else(|| {
                            anyhow!("arguments option is required to contain strings")
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
        }

        if let Some(preview) = section(table, PREVIEW_SECTION)? {
            if let Some(value) = preview.get("width") {
                config.preview.width = Some(dimension(value, "width")?);
            }

            if let Some(value) = preview.get("height") {
                config.preview.height = Some(dimension(value, "height")?);
            }

            if let Some(value) = preview.get("image-format") {
                config.preview.image_format = value
                    .as_str()
                    .ok_or_else(|| anyhow!("image-format option is required to be a string"))?
                    .parse()?;
            }

            if let Some(value) = preview.get("class-name") {
                config.preview.class_name = Some(class_name(value, "class-name")?);
            }

            if let Some(value) = preview.get("root-class-name") {
                config.preview.root_class_name = Some(class_name(value, "root-class-name")?);
            }
        }

        if let Some(display_state) = section(table, DISPLAY_STATE_SECTION)? {
            let value = serde_json::to_value(display_state)
                .context("display-state section could not be converted")?;
            config.display_state = Some(DisplayState::try_from(value)?);
        }

        Ok(config)
    }

    /// Builds the exporter, failing if no command was configured
    pub fn exporter(&self) -> Result<CommandExporter> {
        let command = self.exporter_command.as_deref().ok_or_else(|| {
            anyhow!("No exporter configured, set [exporter] command or pass --exporter")
        })?;

        Ok(CommandExporter::new(command).with_arguments(self.exporter_arguments.iter().cloned()))
    }
}

fn section<'t>(table: &'t Table, name: &str) -> Result<Option<&'t Table>> {
    table
        .get(name)
        .map(|value| {
            value
                .as_table()
                .ok_or_else(|| anyhow!("[{name}] is required to be a table"))
        })
        .transpose()
}

fn dimension(value: &Value, name: &str) -> Result<u32> {
    value
        .as_integer()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| anyhow!("{name} option is required to be a positive integer"))
}

fn class_name(value: &Value, name: &str) -> Result<String> {
    Ok(value
        .as_str()
        .ok_or_else(|| anyhow!("{name} option is required to be a string"))?
        .to_string())
}
