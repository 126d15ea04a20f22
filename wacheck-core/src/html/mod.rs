//! HTML parsing module.
//!
//! Uses `html5gum` to stream tokens into the `generational_arena`-backed
//! `Document` in a single pass. This is a tag-soup builder, not an HTML5 tree
//! builder: no elements are synthesized, and implied end tags are handled by
//! walking up the open elements before block-level boundaries.
//!
//! Content inside `<script>` and `<style>` is kept as a single raw text child
//! and not parsed as HTML, so stylesheet text survives intact.

use html5gum::{EndTag, StartTag, Token, Tokenizer};
use string_cache::DefaultAtom;

use crate::dom::{Document, ElementData, Node, NodeId, TextData};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn parse_html(html: &str) -> Document {
    let mut builder = Builder::new();
    for token in Tokenizer::new(html).infallible() {
        match token {
            Token::StartTag(tag) => builder.start_tag(tag),
            Token::EndTag(tag) => builder.end_tag(tag),
            Token::String(s) => builder.text(&String::from_utf8_lossy(&s)),
            Token::Comment(c) => builder.comment(&String::from_utf8_lossy(&c)),
            Token::Doctype(_) | Token::Error(_) => {}
        }
    }
    tracing::debug!("Parsed HTML into {} nodes", builder.doc.nodes.len());
    builder.doc
}

struct Builder {
    doc: Document,
    current: NodeId,
    /// Set while inside `<style>` or `<script>`.
    raw: Option<DefaultAtom>,
}

impl Builder {
    fn new() -> Self {
        let doc = Document::default();
        let current = doc.root_id;
        Builder {
            doc,
            current,
            raw: None,
        }
    }

    fn start_tag(&mut self, tag: StartTag) {
        let name = String::from_utf8_lossy(&tag.name).to_ascii_lowercase();

        if self.raw.is_some() {
            let mut markup = format!("<{name}");
            for (key, value) in &tag.attributes {
                markup.push_str(&format!(
                    " {}=\"{}\"",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                ));
            }
            markup.push_str(if tag.self_closing { "/>" } else { ">" });
            self.text(&markup);
            return;
        }

        if let Some(open) = self.implied_close(&name) {
            self.current = self.doc.parent_of(open).unwrap_or(self.doc.root_id);
        }

        let attributes = tag
            .attributes
            .iter()
            .map(|(key, value)| {
                (
                    DefaultAtom::from(String::from_utf8_lossy(key).to_ascii_lowercase()),
                    String::from_utf8_lossy(value).into_owned(),
                )
            })
            .collect();
        let node_id = self
            .doc
            .add_node(Node::Element(ElementData::new(&name, attributes)));
        self.doc.append_child(self.current, node_id);

        if VOID_ELEMENTS.contains(&name.as_str()) || tag.self_closing {
            return;
        }
        if name == "style" || name == "script" {
            self.raw = Some(DefaultAtom::from(name.as_str()));
        }
        self.current = node_id;
    }

    /// The open element that starting `name` implicitly closes, if any.
    fn implied_close(&self, name: &str) -> Option<NodeId> {
        let mut check = self.current;
        while let Some(open) = self.doc.name(check) {
            let closes = match name {
                "li" => open == "li",
                "dt" | "dd" => matches!(open, "dt" | "dd"),
                "option" => open == "option",
                "td" | "th" => matches!(open, "td" | "th"),
                "tr" => matches!(open, "tr" | "td" | "th"),
                "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" | "dl"
                | "table" | "pre" | "blockquote" | "form" | "hr" => open == "p",
                _ => false,
            };
            if closes {
                // `tr` closes the row that holds the open cell.
                if name == "tr" && open != "tr" {
                    return self.doc.parent(check).filter(|p| self.doc.name(*p) == Some("tr"));
                }
                return Some(check);
            }
            if matches!(open, "div" | "body" | "td" | "th" | "table" | "ul" | "ol" | "dl" | "select") {
                return None;
            }
            check = self.doc.parent_of(check)?;
        }
        None
    }

    fn end_tag(&mut self, tag: EndTag) {
        let name = String::from_utf8_lossy(&tag.name).to_ascii_lowercase();

        if let Some(raw) = &self.raw {
            if **raw != *name {
                self.text(&format!("</{name}>"));
                return;
            }
            self.raw = None;
        }

        let mut open = Some(self.current);
        while let Some(id) = open {
            match self.doc.name(id) {
                Some(open_name) if open_name == name => {
                    self.current = self.doc.parent_of(id).unwrap_or(self.doc.root_id);
                    return;
                }
                Some(_) => open = self.doc.parent_of(id),
                // Stray end tag.
                None => return,
            }
        }
    }

    /// Comments only survive inside raw text, where old pages use them to
    /// hide stylesheets from browsers that do not know `<style>`.
    fn comment(&mut self, comment: &str) {
        if self.raw.is_some() {
            self.text(&format!("<!--{comment}-->"));
        }
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.doc.last_child_of(self.current) {
            if let Some(Node::Text(existing)) = self.doc.nodes.get_mut(last) {
                existing.text.push_str(text);
                return;
            }
        }
        let id = self.doc.add_node(Node::Text(TextData::new(text)));
        self.doc.append_child(self.current, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &Document, ids: Vec<NodeId>) -> Vec<String> {
        ids.into_iter()
            .filter_map(|id| doc.name(id).map(str::to_string))
            .collect()
    }

    #[test]
    fn builds_nested_elements_with_lowercase_names() {
        let doc = parse_html(r#"<DIV Class="a"><P>Hello <B>world</B></P></DIV>"#);
        let div = doc.elements_named("div").next().unwrap();
        assert_eq!(doc.attr(div, "class"), Some("a"));
        assert_eq!(names(&doc, doc.children(div)), ["p"]);
        let p = doc.children(div)[0];
        assert_eq!(doc.text(p), "Hello ");
        assert_eq!(doc.parent(p), Some(div));
    }

    #[test]
    fn list_items_close_each_other() {
        let doc = parse_html("<ul><li>one<li>two<li>three</ul><p>after");
        let ul = doc.elements_named("ul").next().unwrap();
        assert_eq!(names(&doc, doc.children(ul)), ["li", "li", "li"]);
        let p = doc.elements_named("p").next().unwrap();
        assert_eq!(doc.parent(p), None);
    }

    #[test]
    fn nested_lists_keep_their_items() {
        let doc = parse_html("<ul><li><ul><li>x</li></ul></li></ul>");
        let items: Vec<_> = doc.elements_named("li").collect();
        assert_eq!(items.len(), 2);
        let inner_list = doc.parent(items[1]).unwrap();
        assert_eq!(doc.parent(inner_list), Some(items[0]));
    }

    #[test]
    fn paragraphs_close_before_blocks() {
        let doc = parse_html("<body><p>one<p>two<div>three</div></body>");
        let body = doc.elements_named("body").next().unwrap();
        assert_eq!(names(&doc, doc.children(body)), ["p", "p", "div"]);
    }

    #[test]
    fn table_cells_and_rows() {
        let doc = parse_html("<table><tr><td>a<td>b<tr><th>c</table>");
        let rows: Vec<_> = doc.elements_named("tr").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(names(&doc, doc.children(rows[0])), ["td", "td"]);
        assert_eq!(names(&doc, doc.children(rows[1])), ["th"]);
        let table = doc.elements_named("table").next().unwrap();
        assert_eq!(doc.children(table), rows);
    }

    #[test]
    fn void_elements_take_no_children() {
        let doc = parse_html(r#"<head><link rel="stylesheet" href="a.css"><meta charset="utf-8"><title>t</title></head>"#);
        let head = doc.elements_named("head").next().unwrap();
        assert_eq!(names(&doc, doc.children(head)), ["link", "meta", "title"]);
    }

    #[test]
    fn style_content_is_raw_text() {
        let doc = parse_html("<style>p > a { color: red } <b>not markup</b></style><p>x</p>");
        let style = doc.elements_named("style").next().unwrap();
        assert!(doc.children(style).is_empty());
        assert_eq!(doc.text(style), "p > a { color: red } <b>not markup</b>");
        assert_eq!(doc.elements_named("b").count(), 0);
        assert_eq!(doc.elements_named("p").count(), 1);
    }

    #[test]
    fn comments_inside_style_are_kept() {
        let doc = parse_html("<!-- page --><style><!-- p { color: red } --></style>");
        let style = doc.elements_named("style").next().unwrap();
        assert_eq!(doc.text(style), "<!-- p { color: red } -->");
        assert_eq!(doc.nodes.len(), 3);
    }
}
