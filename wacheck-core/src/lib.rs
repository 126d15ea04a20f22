//! wacheck-core: the style layer of a web accessibility checker.
//!
//! Parses HTML into an intrusive linked list arena-based DOM, discovers the
//! stylesheets a page uses (`<link>`, `<style>`, `@import`), parses them with
//! a hand-written CSS 2 lexer and parser, and resolves a logical property map
//! for every element. Rule checks consume those maps through
//! `Document::style`.
//!
//! Tag, attribute, property and media names are interned with `string_cache`.
//! The crate never touches the network: documents and stylesheets are fetched
//! through a caller-supplied `ResourceLoader`.

pub mod cascade;
pub mod config;
pub mod css;
pub mod dom;
pub mod error;
pub mod html;
pub mod location;

pub use cascade::assign_stylesheets;
pub use config::Config;
pub use css::{PropertyMap, Stylesheet};
pub use dom::{Document, NodeId};
pub use error::{LoadError, ParseError, Severity, StylesheetError, StylesheetErrorKind};
pub use html::parse_html;
pub use location::{FileLoader, Location, MemoryLoader, Resource};

/// Fetches documents and stylesheets on behalf of the parser and the cascade.
pub trait ResourceLoader {
    fn fetch(&self, location: &Location) -> Result<Resource, LoadError>;
}
