//! CSS 2 tokenizing, parsing, selector matching and per-node property
//! resolution.
//!
//! Text goes through `lexer::tokenize` into the recursive-descent `parser`,
//! which builds a `Stylesheet` of media-scoped rules whose selectors are
//! pre-built `Selector` trees with their weights already computed.
//! `Stylesheet::node_properties` resolves the properties one element gets.

pub mod lexer;
pub mod parser;
pub mod selector;
pub mod stylesheet;

pub use lexer::{Token, TokenKind, tokenize};
pub use parser::{ParseContext, parse_declarations, parse_location, parse_stylesheet};
pub use selector::{AttrOperator, Combinator, Selector, Weight};
pub use stylesheet::{
    MediaList, MediaRules, Property, PropertyMap, Rule, Stylesheet, merge_stylesheets,
};
