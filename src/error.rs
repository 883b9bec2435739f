use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Error parsing SVG: {0}")]
    Parse(String),
    #[error("Error writing SVG: {0}")]
    Write(String),
    #[error("SVG document has no root element")]
    MissingRoot,
    #[error("Expected an <svg> root element but found <{0}>")]
    UnexpectedRoot(String),
    #[error("SVG elements are nested deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Error, Debug)]
pub enum DisplayStateError {
    #[error("display state must be an object, found {0}")]
    NotAnObject(&'static str),
    #[error("display state must not set the layout offset field {0:?}")]
    OffsetField(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Exporter exited with {status}: {stderr}")]
    Command { status: ExitStatus, stderr: String },
    #[error("Exporter produced an invalid document: {0}")]
    Document(#[from] DocumentError),
    #[error("Failed to encode export request: {0}")]
    Request(#[from] serde_json::Error),
    #[error("Failed to run exporter: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal Error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Export for generation {generation} failed: {source}")]
    Export {
        generation: u64,
        #[source]
        source: ExportError,
    },
}
