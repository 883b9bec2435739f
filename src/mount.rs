use tokio::sync::watch;
use xml::escape::escape_str_attribute;

use crate::config::PreviewOptions;
use crate::document::SvgDocument;
use crate::error::DocumentError;
use crate::pipeline::PreviewState;

/// Serialized SVG that came out of the export pipeline.
///
/// Markup is injected into render targets without any sanitization, so this can only be created from
/// documents produced by an exporter. Never build one from user-supplied markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedMarkup(String);

impl TrustedMarkup {
    pub(crate) fn from_document(document: &SvgDocument) -> Result<Self, DocumentError> {
        Ok(TrustedMarkup(document.to_markup()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A container owned by the caller that a preview is mounted into
pub trait RenderTarget {
    fn set_class_name(&mut self, class_name: &str);

    fn set_trusted_inner_html(&mut self, markup: &TrustedMarkup);

    fn clear_inner_html(&mut self);
}

/// A `<div>` built up in memory
#[derive(Clone, Debug, Default)]
pub struct HtmlContainer {
    class_name: String,
    inner_html: String,
    renders: usize,
}

impl HtmlContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn inner_html(&self) -> &str {
        &self.inner_html
    }

    /// How many times the contents were replaced
    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="{}">{}</div>"#,
            escape_str_attribute(&self.class_name),
            self.inner_html
        )
    }
}

impl RenderTarget for HtmlContainer {
    fn set_class_name(&mut self, class_name: &str) {
        class_name.clone_into(&mut self.class_name);
    }

    fn set_trusted_inner_html(&mut self, markup: &TrustedMarkup) {
        markup.as_str().clone_into(&mut self.inner_html);
        self.renders += 1;
    }

    fn clear_inner_html(&mut self) {
        self.inner_html.clear();
        self.renders += 1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Rendered {
    generation: u64,
    root_class_name: String,
    image_class_name: Option<String>,
}

/// Mirrors the published preview into a render target
pub struct PreviewView<T> {
    target: T,
    root_class_name: String,
    image_class_name: Option<String>,
    rendered: Option<Rendered>,
}

impl<T: RenderTarget> PreviewView<T> {
    pub fn new(target: T, options: &PreviewOptions) -> Self {
        PreviewView {
            target,
            root_class_name: options.root_class_name.clone().unwrap_or_default(),
            image_class_name: options.class_name.clone(),
            rendered: None,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }

    pub fn set_root_class_name<S: Into<String>>(&mut self, class_name: S) {
        self.root_class_name = class_name.into();
    }

    pub fn set_image_class_name(&mut self, class_name: Option<String>) {
        self.image_class_name = class_name;
    }

    /// Renders `state` unless it's exactly what's already in the target. Returns whether the target
    /// was touched.
    pub fn render(&mut self, state: &PreviewState) -> Result<bool, DocumentError> {
        let rendered = Rendered {
            generation: state.generation,
            root_class_name: self.root_class_name.clone(),
            image_class_name: self.image_class_name.clone(),
        };
        if self.rendered.as_ref() == Some(&rendered) {
            return Ok(false);
        }

        self.target.set_class_name(&self.root_class_name);
        match (&state.document, &self.image_class_name) {
            (Some(document), Some(class_name)) => {
                let markup =
                    TrustedMarkup::from_document(&document.with_attribute("class", class_name))?;
                self.target.set_trusted_inner_html(&markup);
            }
            (Some(document), None) => {
                self.target
                    .set_trusted_inner_html(&TrustedMarkup::from_document(document)?);
            }
            (None, _) => self.target.clear_inner_html(),
        }

        log::trace!("Rendered preview generation {}", state.generation);
        self.rendered = Some(rendered);

        Ok(true)
    }

    /// Keeps rendering every published change until the preview goes away
    pub async fn follow(
        &mut self,
        mut receiver: watch::Receiver<PreviewState>,
    ) -> Result<(), DocumentError> {
        loop {
            let state = receiver.borrow_and_update().clone();
            self.render(&state)?;

            if receiver.changed().await.is_err() {
                return Ok(());
            }
        }
    }
}
