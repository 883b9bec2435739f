//! Post-processing applied to every exported SVG before it is published.
//!
//! Each step takes a document by reference and returns a new one, so the intermediate results can
//! be inspected on their own.

use lazy_static::lazy_static;
use regex::Regex;

use crate::document::SvgDocument;

/// The exporter embeds its font-face rules at `<svg><defs><style>`
const EMBEDDED_STYLE_DEPTH: usize = 2;

lazy_static! {
    static ref VIEW_BOX_SEPARATOR_RE: Regex = Regex::new(r"[\s,]+").unwrap();
}

/// Runs the full normalization: drop the embedded style, size from the view box, then make the
/// image fill its container.
pub fn normalize(document: &SvgDocument) -> SvgDocument {
    let document = strip_embedded_style(document);
    let document = correct_dimensions(&document);

    finalize_for_display(&document)
}

/// Removes the exporter's embedded `<style>` (it loads fonts from a remote host).
///
/// Only the element at the root's first-child/first-child path is considered. Anything else is left
/// alone.
pub fn strip_embedded_style(document: &SvgDocument) -> SvgDocument {
    let is_style = document
        .first_element_descendant(EMBEDDED_STYLE_DEPTH)
        .is_some_and(|element| element.local_name() == "style");

    if !is_style {
        return document.clone();
    }

    log::trace!("Removing embedded style from exported SVG");
    document
        .without_first_element_descendant(EMBEDDED_STYLE_DEPTH)
        .unwrap_or_else(|| document.clone())
}

/// The exporter scales `width`/`height` against the view box, so the view box dimensions are the
/// real size of the image.
pub fn correct_dimensions(document: &SvgDocument) -> SvgDocument {
    let Some(raw_view_box) = document.attribute("viewBox") else {
        return document.clone();
    };

    match ViewBox::parse(raw_view_box) {
        Some(view_box) => document
            .with_attribute("width", &view_box.raw_width)
            .with_attribute("height", &view_box.raw_height),
        None => {
            log::warn!("Ignoring malformed viewBox {raw_view_box:?}, keeping exported size");
            document.clone()
        }
    }
}

/// Makes the image fill its container. `display="block"` avoids the gap below inline images.
pub fn finalize_for_display(document: &SvgDocument) -> SvgDocument {
    document
        .with_attribute("width", "100%")
        .with_attribute("height", "100%")
        .with_attribute("display", "block")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
    /// width and height as written in the document, so they can be copied over untouched
    raw_width: String,
    raw_height: String,
}

impl ViewBox {
    /// Parses `min-x min-y width height`, separated by whitespace and/or commas.
    ///
    /// Returns `None` unless there are exactly four finite numbers.
    pub fn parse(raw: &str) -> Option<ViewBox> {
        let fields = VIEW_BOX_SEPARATOR_RE
            .split(raw.trim())
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>();

        let [min_x, min_y, width, height] = fields.as_slice() else {
            return None;
        };

        let number = |field: &str| field.parse::<f64>().ok().filter(|n| n.is_finite());

        Some(ViewBox {
            min_x: number(*min_x)?,
            min_y: number(*min_y)?,
            width: number(*width)?,
            height: number(*height)?,
            raw_width: width.to_string(),
            raw_height: height.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EXPORTED: &str = include_str!("../tests/excalidraw.svg");

    fn svg(source: &str) -> SvgDocument {
        SvgDocument::parse(source).unwrap()
    }

    #[test]
    fn view_box_parsing() {
        let view_box = ViewBox::parse("0 0 300 150").unwrap();
        assert_eq!(view_box.min_x, 0.0);
        assert_eq!(view_box.width, 300.0);
        assert_eq!(view_box.height, 150.0);

        let view_box = ViewBox::parse("  -10.5,20   1e2, 40.25 ").unwrap();
        assert_eq!(view_box.min_x, -10.5);
        assert_eq!(view_box.min_y, 20.0);
        assert_eq!(view_box.width, 100.0);
        assert_eq!(view_box.height, 40.25);

        assert_eq!(ViewBox::parse(""), None);
        assert_eq!(ViewBox::parse("0 0 300"), None);
        assert_eq!(ViewBox::parse("0 0 300 150 7"), None);
        assert_eq!(ViewBox::parse("0 0 wide 150"), None);
        assert_eq!(ViewBox::parse("0 0 NaN 150"), None);
    }

    #[test]
    fn dimensions_come_from_view_box() {
        let document =
            svg(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 300 150" width="600" height="300"></svg>"#);

        let corrected = correct_dimensions(&document);
        assert_eq!(corrected.attribute("width"), Some("300"));
        assert_eq!(corrected.attribute("height"), Some("150"));

        let finalized = normalize(&document);
        assert_eq!(finalized.attribute("width"), Some("100%"));
        assert_eq!(finalized.attribute("height"), Some("100%"));
        assert_eq!(finalized.attribute("display"), Some("block"));
        assert_eq!(finalized.attribute("viewBox"), Some("0 0 300 150"));
    }

    #[test]
    fn dimensions_use_view_box_size_not_origin() {
        let document = svg(r#"<svg viewBox="10 20 30.5 40" width="61" height="80"/>"#);

        let corrected = correct_dimensions(&document);
        assert_eq!(corrected.attribute("width"), Some("30.5"));
        assert_eq!(corrected.attribute("height"), Some("40"));
    }

    #[test]
    fn missing_view_box_keeps_exported_size() {
        let document = svg(r#"<svg width="600" height="300"><rect/></svg>"#);

        assert_eq!(correct_dimensions(&document), document);

        let finalized = normalize(&document);
        assert_eq!(finalized.attribute("width"), Some("100%"));
        assert_eq!(finalized.attribute("height"), Some("100%"));
        assert_eq!(finalized.attribute("viewBox"), None);
    }

    #[test]
    fn malformed_view_box_is_ignored() {
        let document = svg(r#"<svg viewBox="0 0 300" width="600" height="300"/>"#);

        assert_eq!(correct_dimensions(&document), document);
        assert_eq!(normalize(&document).attribute("width"), Some("100%"));
    }

    #[test]
    fn embedded_style_is_removed() {
        let document = svg(EXPORTED);
        assert!(document
            .elements()
            .iter()
            .any(|element| element.local_name() == "style"));

        let normalized = normalize(&document);
        assert!(normalized
            .elements()
            .iter()
            .all(|element| element.local_name() != "style"));

        let markup = normalized.to_markup().unwrap();
        assert!(!markup.contains("@font-face"), "{markup}");
        // the rest of the drawing survives
        assert!(markup.contains("<rect"), "{markup}");
        assert!(markup.contains("Hello"), "{markup}");
    }

    #[test]
    fn style_elsewhere_is_kept() {
        // not at the first-child/first-child path
        let document = svg(r#"<svg><defs><clipPath/><style>.a{}</style></defs></svg>"#);
        assert_eq!(strip_embedded_style(&document), document);

        let document = svg(r#"<svg><style>.a{}</style><g/></svg>"#);
        assert_eq!(strip_embedded_style(&document), document);

        let document = svg(r#"<svg><g><path/></g></svg>"#);
        assert_eq!(strip_embedded_style(&document), document);
    }

    #[test]
    fn leading_text_does_not_hide_the_style() {
        let document = svg("<svg>\n  <!-- source -->\n  <defs>\n    <style>.a{}</style>\n  </defs>\n</svg>");

        let stripped = strip_embedded_style(&document);
        assert!(stripped
            .elements()
            .iter()
            .all(|element| element.local_name() != "style"));
        assert_eq!(
            stripped.first_element_descendant(1).map(|e| e.local_name()),
            Some("defs")
        );
    }

    #[test]
    fn normalization_does_not_touch_its_input() {
        let document = svg(EXPORTED);
        let before = document.to_markup().unwrap();

        let _ = normalize(&document);

        assert_eq!(document.to_markup().unwrap(), before);
    }

    #[test]
    fn normalization_is_deterministic() {
        let document = svg(EXPORTED);

        assert_eq!(
            normalize(&document).to_markup().unwrap(),
            normalize(&document).to_markup().unwrap()
        );
        assert_eq!(normalize(&normalize(&document)), normalize(&document));
    }
}
