//! Stylesheet discovery for a document and per-element property assignment.
//!
//! `assign_stylesheets` finds the document's default style type, loads every
//! `<link rel="stylesheet">` and `<style>` sheet, merges them (links first,
//! each group in document order) and stores the resolved properties on every
//! element. Inline `style` attributes are applied last and always win.

use crate::ResourceLoader;
use crate::config::{CSS_TYPE, Config};
use crate::css::{ParseContext, Stylesheet, parse_declarations, parse_location, parse_stylesheet};
use crate::dom::{Document, NodeId};
use crate::error::StylesheetError;
use crate::location::Location;

/// Computes and stores the style of every element in `document`.
///
/// Runs once per document; later calls change nothing and return no errors.
/// Problems found along the way are returned rather than raised, and the
/// document still gets whatever styling the usable sheets provide.
pub fn assign_stylesheets(
    document: &mut Document,
    loader: &dyn ResourceLoader,
    config: &Config,
) -> Vec<StylesheetError> {
    if document.styles_assigned {
        return Vec::new();
    }
    let mut errors = Vec::new();

    let style_type = default_style_type(document);
    if let Some(declared) = style_type.as_deref() {
        if !is_css(declared) {
            errors.push(StylesheetError::unknown_type(
                None,
                "The specified page stylesheet is of unknown type",
                declared,
            ));
        }
    }

    let base = base_location(document);
    let mut sheet = Stylesheet::default();
    load_linked(document, base.as_ref(), loader, config, &mut sheet, &mut errors);
    load_embedded(document, base.as_ref(), loader, config, &mut sheet, &mut errors);
    tracing::debug!("Merged {} stylesheet rules", sheet.len());

    let elements = document.elements();
    for &node in &elements {
        let mut properties = sheet.node_properties(document, node, &config.media);

        if let Some(inline) = document.attr(node, "style").filter(|s| !s.is_empty()) {
            match style_type.as_deref() {
                Some(declared) if is_css(declared) => {
                    let mut ctx = ParseContext::new(loader, config);
                    match parse_declarations(inline, &mut ctx) {
                        Ok(declarations) => {
                            for declaration in declarations {
                                properties.insert(declaration.name, declaration.value);
                            }
                        }
                        Err(err) => {
                            tracing::debug!("Inline style does not parse: {}", err);
                            errors.push(StylesheetError::parse(Some(node), "inline"));
                        }
                    }
                }
                Some(_) => errors.push(StylesheetError::unknown_type(
                    Some(node),
                    "Unknown stylesheet type",
                    inline,
                )),
                None => errors.push(StylesheetError::no_type(node, inline)),
            }
        }

        document.set_style(node, properties);
    }

    document.styles_assigned = true;
    tracing::debug!(
        "Assigned styles to {} elements with {} errors",
        elements.len(),
        errors.len()
    );
    errors
}

fn is_css(style_type: &str) -> bool {
    style_type.trim().eq_ignore_ascii_case(CSS_TYPE)
}

/// The `Content-Style-Type` response header, else the last matching
/// `<meta http-equiv>`.
fn default_style_type(document: &Document) -> Option<String> {
    if let Some(header) = document
        .header("content-style-type")
        .map(str::trim)
        .filter(|h| !h.is_empty())
    {
        return Some(header.to_string());
    }
    document
        .elements_named("meta")
        .filter(|&meta| {
            document
                .attr(meta, "http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-style-type"))
        })
        .filter_map(|meta| document.attr(meta, "content"))
        .last()
        .map(|content| content.trim().to_string())
}

/// The document location, replaced by the last `<base href>`.
fn base_location(document: &Document) -> Option<Location> {
    let mut base = document.location.clone();
    for node in document.elements_named("base") {
        let Some(href) = document.attr(node, "href").filter(|h| !h.trim().is_empty()) else {
            continue;
        };
        match Location::resolve(document.location.as_ref(), href) {
            Ok(location) => base = Some(location),
            Err(err) => tracing::warn!("Ignoring <base href={:?}>: {}", href, err),
        }
    }
    base
}

/// A `type` attribute other than `text/css`, reported against `node`.
fn declared_foreign_type(document: &Document, node: NodeId) -> Option<StylesheetError> {
    let declared = document.attr(node, "type").filter(|t| !t.trim().is_empty())?;
    (!is_css(declared))
        .then(|| StylesheetError::unknown_type(Some(node), "Unknown stylesheet type", declared))
}

fn load_linked(
    document: &Document,
    base: Option<&Location>,
    loader: &dyn ResourceLoader,
    config: &Config,
    sheet: &mut Stylesheet,
    errors: &mut Vec<StylesheetError>,
) {
    for node in document.elements_named("link") {
        let is_stylesheet = document.attr(node, "rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("stylesheet"))
        });
        if !is_stylesheet {
            continue;
        }
        if let Some(err) = declared_foreign_type(document, node) {
            errors.push(err);
            continue;
        }
        let Some(href) = document.attr(node, "href").filter(|h| !h.trim().is_empty()) else {
            continue;
        };

        let location = match Location::resolve(base, href) {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!("Cannot resolve stylesheet link {:?}: {}", href, err);
                errors.push(StylesheetError::parse(Some(node), href));
                continue;
            }
        };
        tracing::debug!("Loading linked stylesheet {}", location);
        let mut ctx = ParseContext::new(loader, config);
        match parse_location(&location, &mut ctx) {
            Ok(linked) => sheet.extend(linked),
            Err(err) => {
                tracing::warn!("Skipping linked stylesheet: {}", err);
                errors.push(StylesheetError::parse(Some(node), location.as_str()));
            }
        }
    }
}

fn load_embedded(
    document: &Document,
    base: Option<&Location>,
    loader: &dyn ResourceLoader,
    config: &Config,
    sheet: &mut Stylesheet,
    errors: &mut Vec<StylesheetError>,
) {
    for node in document.elements_named("style") {
        if let Some(err) = declared_foreign_type(document, node) {
            errors.push(err);
            continue;
        }
        let mut ctx = ParseContext::new(loader, config);
        if let Some(base) = base {
            ctx = ctx.with_location(base.clone());
        }
        match parse_stylesheet(&document.text(node), &mut ctx) {
            Ok(embedded) => sheet.extend(embedded),
            Err(err) => {
                tracing::debug!("Embedded stylesheet does not parse: {}", err);
                let data = base.map_or_else(|| "style".to_string(), |b| b.to_string());
                errors.push(StylesheetError::parse(Some(node), data));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StylesheetErrorKind;
    use crate::html::parse_html;
    use crate::location::MemoryLoader;

    fn assign(html: &str, loader: &MemoryLoader) -> (Document, Vec<StylesheetError>) {
        let mut doc = parse_html(html)
            .with_location(Location::parse("http://example.org/site/index.html").unwrap());
        let errors = assign_stylesheets(&mut doc, loader, &Config::default());
        (doc, errors)
    }

    fn style_of<'d>(doc: &'d Document, name: &str, property: &str) -> Option<&'d str> {
        let node = doc.elements_named(name).next()?;
        doc.style(node)?.get(property)
    }

    fn kinds(errors: &[StylesheetError]) -> Vec<StylesheetErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    const CSS_META: &str = r#"<meta http-equiv="Content-Style-Type" content="text/css">"#;

    #[test]
    fn inline_style_overrides_any_sheet_rule() {
        let html = format!(
            r#"{CSS_META}<style>#x.y {{ color: blue; margin: 0 }}</style>
               <p id="x" class="y" style="color: green">t</p>"#
        );
        let (doc, errors) = assign(&html, &MemoryLoader::new());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(style_of(&doc, "p", "color"), Some("green"));
        assert_eq!(style_of(&doc, "p", "margin"), Some("0"));
    }

    #[test]
    fn response_header_sets_the_style_type() {
        let mut doc = parse_html(r#"<p style="color: green">t</p>"#)
            .with_headers(vec![("Content-Style-Type".to_string(), "text/css".to_string())]);
        let errors = assign_stylesheets(&mut doc, &MemoryLoader::new(), &Config::default());
        assert!(errors.is_empty());
        assert_eq!(style_of(&doc, "p", "color"), Some("green"));
    }

    #[test]
    fn blank_header_falls_back_to_meta() {
        let mut doc = parse_html(&format!(r#"{CSS_META}<p style="color: green">t</p>"#))
            .with_headers(vec![("Content-Style-Type".to_string(), "  ".to_string())]);
        let errors = assign_stylesheets(&mut doc, &MemoryLoader::new(), &Config::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(style_of(&doc, "p", "color"), Some("green"));
    }

    #[test]
    fn style_attribute_without_a_type_is_an_error() {
        let (doc, errors) = assign(
            r#"<style>p { color: blue }</style><p style="color: green">t</p>"#,
            &MemoryLoader::new(),
        );
        assert_eq!(kinds(&errors), [StylesheetErrorKind::NoStylesheetType]);
        assert_eq!(errors[0].data.as_deref(), Some("color: green"));
        assert_eq!(errors[0].node, doc.elements_named("p").next());
        assert_eq!(style_of(&doc, "p", "color"), Some("blue"));
    }

    #[test]
    fn foreign_default_type_is_reported_for_page_and_attributes() {
        let (doc, errors) = assign(
            r#"<meta http-equiv="content-style-type" content="text/xsl"><p style="x: y">t</p>"#,
            &MemoryLoader::new(),
        );
        assert_eq!(
            kinds(&errors),
            [
                StylesheetErrorKind::UnknownStylesheetType,
                StylesheetErrorKind::UnknownStylesheetType
            ]
        );
        assert_eq!(errors[0].node, None);
        assert_eq!(errors[0].data.as_deref(), Some("text/xsl"));
        assert_eq!(errors[1].data.as_deref(), Some("x: y"));
        assert_eq!(style_of(&doc, "p", "x"), None);
    }

    #[test]
    fn links_resolve_against_base_and_come_before_style_blocks() {
        let loader = MemoryLoader::new().with("http://cdn.example.org/css/site.css", "p { color: red }");
        let (doc, errors) = assign(
            r#"<base href="http://cdn.example.org/css/">
               <style>p { color: blue; margin: 0 }</style>
               <link rel="Alternate StyleSheet" href="site.css">
               <p>t</p>"#,
            &loader,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(style_of(&doc, "p", "color"), Some("red"));
        assert_eq!(style_of(&doc, "p", "margin"), Some("0"));
    }

    #[test]
    fn unreachable_links_and_broken_sheets_are_reported() {
        let loader = MemoryLoader::new().with("http://example.org/site/bad.css", "p { color: ");
        let (doc, errors) = assign(
            r#"<link rel="stylesheet" href="missing.css">
               <link rel="stylesheet" href="bad.css">
               <link rel="stylesheet" type="text/xsl" href="x.xsl">
               <link rel="icon" href="favicon.ico">
               <style>p { color: }</style>
               <style type="text/sass">p { }</style>
               <p>t</p>"#,
            &loader,
        );
        assert_eq!(
            kinds(&errors),
            [
                StylesheetErrorKind::StylesheetParse,
                StylesheetErrorKind::StylesheetParse,
                StylesheetErrorKind::UnknownStylesheetType,
                StylesheetErrorKind::StylesheetParse,
                StylesheetErrorKind::UnknownStylesheetType,
            ]
        );
        assert_eq!(errors[0].data.as_deref(), Some("http://example.org/site/missing.css"));
        assert_eq!(errors[2].data.as_deref(), Some("text/xsl"));
        assert!(doc.style(doc.elements_named("p").next().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn broken_inline_style_reports_inline() {
        let html = format!(r#"{CSS_META}<p style="color: {{ red">t</p>"#);
        let (_, errors) = assign(&html, &MemoryLoader::new());
        assert_eq!(kinds(&errors), [StylesheetErrorKind::StylesheetParse]);
        assert_eq!(errors[0].data.as_deref(), Some("inline"));
    }

    #[test]
    fn imports_inside_style_blocks_use_the_document_location() {
        let loader = MemoryLoader::new().with("http://example.org/site/print.css", "em { color: black }");
        let (doc, errors) = assign(
            r#"<style>@import "print.css" print; @import "print.css"; p { color: red }</style><p><em>x</em></p>"#,
            &loader,
        );
        assert!(errors.is_empty());
        assert_eq!(style_of(&doc, "em", "color"), Some("black"));
        assert_eq!(style_of(&doc, "p", "color"), Some("red"));
    }

    #[test]
    fn assignment_runs_once() {
        let html = format!(
            r#"{CSS_META}<link rel="stylesheet" href="gone.css"><style>li {{ color: red }}</style>
               <ul><li style="margin: 0">a</li></ul>"#
        );
        let loader = MemoryLoader::new();
        let (mut doc, first) = assign(&html, &loader);
        assert_eq!(first.len(), 1);
        let before: Vec<_> = doc.elements().iter().map(|&n| doc.style(n).cloned()).collect();

        let second = assign_stylesheets(&mut doc, &loader, &Config::default());
        assert!(second.is_empty());
        let after: Vec<_> = doc.elements().iter().map(|&n| doc.style(n).cloned()).collect();
        assert_eq!(before, after);
        assert_eq!(style_of(&doc, "li", "color"), Some("red"));
        assert_eq!(style_of(&doc, "li", "margin"), Some("0"));
    }

    #[test]
    fn requested_media_selects_rules() {
        let mut doc = parse_html(
            "<style>@media print { p { color: black } } @media screen { p { color: blue } }</style><p>t</p>",
        );
        let errors =
            assign_stylesheets(&mut doc, &MemoryLoader::new(), &Config::default().with_media("PRINT"));
        assert!(errors.is_empty());
        assert_eq!(style_of(&doc, "p", "color"), Some("black"));
    }
}
