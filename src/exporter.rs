use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use futures::future;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::document::SvgDocument;
use crate::error::ExportError;
use crate::scene::{DisplayState, ElementSet};

/// Turns a set of elements into an SVG document.
///
/// Exports may take a while and may fail; a preview never retries them.
pub trait VectorExporter {
    #[allow(async_fn_in_trait)]
    async fn export(&self, request: &ExportRequest<'_>) -> Result<SvgDocument, ExportError>;
}

/// The arguments of a single export, serialized the way Excalidraw's `exportToSvg` takes them
#[derive(Serialize, Debug, Clone)]
pub struct ExportRequest<'a> {
    #[serde(rename = "appState")]
    pub display_state: &'a DisplayState,
    pub elements: &'a ElementSet,
    /// embedded image files, previews never carry any
    #[serde(rename = "files")]
    pub attachments: Option<&'a Value>,
}

impl<'a> ExportRequest<'a> {
    pub fn new(elements: &'a ElementSet, display_state: &'a DisplayState) -> Self {
        ExportRequest {
            display_state,
            elements,
            attachments: None,
        }
    }
}

/// Exports by running an external program. The request is written to its stdin as JSON and the SVG
/// is read back from its stdout.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    pub command: String,
    pub arguments: Vec<String>,
}

impl CommandExporter {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            arguments: vec![],
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }
}

impl VectorExporter for CommandExporter {
    async fn export(&self, request: &ExportRequest<'_>) -> Result<SvgDocument, ExportError> {
        let payload = serde_json::to_vec(request)?;

        log::debug!(
            "Exporting {} elements with {} {:?}",
            request.elements.len(),
            self.command,
            self.arguments
        );

        let output = call_exporter(&self.command, &self.arguments, &payload).await?;

        if !output.status.success() {
            return Err(ExportError::Command {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let source = String::from_utf8(output.stdout).map_err(anyhow::Error::from)?;

        Ok(SvgDocument::parse(&source)?)
    }
}

async fn call_exporter(
    command: &str,
    arguments: &[String],
    payload: &[u8],
) -> Result<Output, ExportError> {
    let mut child = Command::new(command)
        .args(arguments)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = child.stdin.take();
    let write_request = async move {
        if let Some(mut stdin) = stdin {
            match stdin.write_all(payload).await {
                // the exporter gave up early, its exit status and stderr say why
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    log::debug!("Exporter closed stdin before reading the whole request")
                }
                result => result?,
            }
            // dropping stdin closes it so the exporter sees the end of the request
        }

        Ok::<_, io::Error>(())
    };

    let (written, output) = future::join(write_request, child.wait_with_output()).await;
    let output = output?;
    written?;

    Ok(output)
}

/// Serves a document that was exported ahead of time, whatever the request
#[derive(Debug, Clone)]
pub struct FileExporter {
    path: PathBuf,
}

impl FileExporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl VectorExporter for FileExporter {
    async fn export(&self, _request: &ExportRequest<'_>) -> Result<SvgDocument, ExportError> {
        log::debug!("Reading exported SVG from {:?}", self.path);
        let source = tokio::fs::read_to_string(&self.path).await?;

        Ok(SvgDocument::parse(&source)?)
    }
}

#[cfg(all(test, unix))]
mod test {
    use serde_json::json;

    use super::*;

    fn input() -> (ElementSet, DisplayState) {
        (
            ElementSet::new(vec![json!({ "id": "a", "type": "rectangle" })]),
            DisplayState::try_from(json!({ "exportBackground": true })).unwrap(),
        )
    }

    #[test]
    fn request_wire_format() {
        let (elements, display_state) = input();
        let request = ExportRequest::new(&elements, &display_state);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "appState": { "exportBackground": true },
                "elements": [{ "id": "a", "type": "rectangle" }],
                "files": null,
            })
        );
    }

    #[tokio::test]
    async fn export_reads_svg_from_stdout() {
        let (elements, display_state) = input();
        let exporter = CommandExporter::new("sh").with_arguments([
            "-c",
            r#"cat > /dev/null; printf '<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 4 2" width="8" height="4"><rect/></svg>'"#,
        ]);

        let document = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap();

        assert_eq!(document.attribute("viewBox"), Some("0 0 4 2"));
        assert_eq!(document.attribute("width"), Some("8"));
    }

    #[tokio::test]
    async fn export_receives_request_on_stdin() {
        let (elements, display_state) = input();
        // echo the element id back as the svg's id
        let exporter = CommandExporter::new("sh").with_arguments([
            "-c",
            r#"id=$(sed -n 's/.*"id":"\([a-z]*\)".*/\1/p'); printf '<svg id="%s"/>' "$id""#,
        ]);

        let document = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap();

        assert_eq!(document.attribute("id"), Some("a"));
    }

    #[tokio::test]
    async fn export_failure_carries_stderr() {
        let (elements, display_state) = input();
        let exporter = CommandExporter::new("sh")
            .with_arguments(["-c", "cat > /dev/null; echo 'unsupported element' >&2; exit 3"]);

        let err = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap_err();

        match err {
            ExportError::Command { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "unsupported element");
            }
            e => panic!("Unexpected error {e:?}"),
        }
    }

    #[tokio::test]
    async fn export_failure_without_reading_request() {
        // far more than a pipe buffer holds
        let elements = ElementSet::new(
            (0..5000)
                .map(|i| {
                    json!({
                        "id": format!("element-{i}"),
                        "type": "rectangle",
                        "text": "x".repeat(32),
                    })
                })
                .collect(),
        );
        let (_, display_state) = input();
        let exporter = CommandExporter::new("sh")
            .with_arguments(["-c", "echo 'unknown flag' >&2; exit 2"]);

        let err = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap_err();

        match err {
            ExportError::Command { status, stderr } => {
                assert_eq!(status.code(), Some(2));
                assert_eq!(stderr, "unknown flag");
            }
            e => panic!("Unexpected error {e:?}"),
        }
    }

    #[tokio::test]
    async fn export_rejects_invalid_documents() {
        let (elements, display_state) = input();
        let exporter = CommandExporter::new("sh")
            .with_arguments(["-c", "cat > /dev/null; printf 'not svg'"]);

        let err = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Document(_)), "{err:?}");
    }

    #[tokio::test]
    async fn file_exporter_reads_fixture() {
        let (elements, display_state) = input();
        let exporter = FileExporter::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/excalidraw.svg"));

        let document = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap();

        assert_eq!(document.attribute("viewBox"), Some("0 0 300 150"));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let (elements, display_state) = input();
        let exporter = CommandExporter::new("definitely-not-an-excalidraw-exporter");

        let err = exporter
            .export(&ExportRequest::new(&elements, &display_state))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Io(_)), "{err:?}");
    }
}
