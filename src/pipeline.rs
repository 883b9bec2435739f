use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::config::{ImageFormat, PreviewOptions};
use crate::document::SvgDocument;
use crate::error::PreviewError;
use crate::exporter::{ExportRequest, VectorExporter};
use crate::normalize::normalize;
use crate::scene::PreviewInput;

/// What is currently on display
#[derive(Clone, Debug, Default)]
pub struct PreviewState {
    /// generation of `document`, 0 until something is published
    pub generation: u64,
    pub document: Option<Arc<SvgDocument>>,
    /// the most recent export that failed while it was still current
    pub failure: Option<ExportFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFailure {
    pub generation: u64,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The export finished while it was still the latest one and is now on display
    Published { generation: u64 },
    /// A newer export was started before this one finished, so its result was dropped
    Superseded { generation: u64 },
    /// There is no display state, nothing was exported
    Skipped,
    /// The input is the same as the last one, nothing was exported
    Unchanged,
}

/// Keeps a normalized SVG export of the latest input on display.
///
/// Every export is tagged with a generation when it starts. Exports can overlap, but only the
/// result of the most recently started one is ever published, however the exports interleave.
pub struct Preview<E> {
    exporter: E,
    options: PreviewOptions,
    issued: AtomicU64,
    last_input: Mutex<Option<PreviewInput>>,
    state: watch::Sender<PreviewState>,
}

impl<E: VectorExporter> Preview<E> {
    pub fn new(exporter: E, options: PreviewOptions) -> Self {
        if options.image_format == ImageFormat::Raster {
            log::warn!("Raster previews aren't supported, rendering as SVG instead");
        }
        if options.width.is_some() || options.height.is_some() {
            log::debug!(
                "Ignoring size hints {:?}x{:?}, previews fill their container",
                options.width,
                options.height
            );
        }

        let (state, _) = watch::channel(PreviewState::default());

        Preview {
            exporter,
            options,
            issued: AtomicU64::new(0),
            last_input: Mutex::new(None),
            state,
        }
    }

    pub fn options(&self) -> &PreviewOptions {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    pub fn current_document(&self) -> Option<Arc<SvgDocument>> {
        self.state.borrow().document.clone()
    }

    /// Re-exports if `input` differs from the last input passed here
    pub async fn update(&self, input: PreviewInput) -> Result<UpdateOutcome, PreviewError> {
        {
            let mut last_input = self
                .last_input
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last_input.as_ref() == Some(&input) {
                log::trace!("Preview input unchanged");
                return Ok(UpdateOutcome::Unchanged);
            }
            *last_input = Some(input.clone());
        }

        self.refresh(&input).await
    }

    /// Exports, normalizes and publishes `input`, unless a newer export was started in the meantime
    pub async fn refresh(&self, input: &PreviewInput) -> Result<UpdateOutcome, PreviewError> {
        let Some(display_state) = input.display_state.as_ref() else {
            log::trace!("No display state, skipping export");
            return Ok(UpdateOutcome::Skipped);
        };

        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!(
            "Starting export {generation} of {} elements",
            input.elements.len()
        );

        let request = ExportRequest::new(&input.elements, display_state);
        match self.exporter.export(&request).await {
            Ok(exported) => {
                let document = Arc::new(normalize(&exported));

                let published = self.state.send_if_modified(|state| {
                    if !self.is_current(generation, state) {
                        return false;
                    }

                    state.generation = generation;
                    state.document = Some(document);
                    state.failure = None;
                    true
                });

                if published {
                    log::debug!("Published export {generation}");
                    Ok(UpdateOutcome::Published { generation })
                } else {
                    log::debug!("Dropping export {generation}, a newer one was started");
                    Ok(UpdateOutcome::Superseded { generation })
                }
            }
            Err(source) => {
                let message = source.to_string();
                let recorded = self.state.send_if_modified(|state| {
                    if !self.is_current(generation, state) {
                        return false;
                    }

                    state.failure = Some(ExportFailure {
                        generation,
                        message,
                    });
                    true
                });

                if recorded {
                    log::warn!("Export {generation} failed: {source}");
                    Err(PreviewError::Export { generation, source })
                } else {
                    log::debug!("Ignoring failure of superseded export {generation}: {source}");
                    Ok(UpdateOutcome::Superseded { generation })
                }
            }
        }
    }

    fn is_current(&self, generation: u64, state: &PreviewState) -> bool {
        self.issued.load(Ordering::SeqCst) == generation && state.generation < generation
    }
}
