//! Error types shared by the loaders, the CSS parser and the cascade.

use thiserror::Error;

use crate::dom::NodeId;

/// Failure to resolve or fetch a location.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("not an absolute file path: {}", .0.display())]
    InvalidPath(std::path::PathBuf),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural failure of a whole parse. The `Display` form is the diagnostic
/// string handed back to callers in place of a stylesheet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("CSS syntax error at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        ParseError {
            offset,
            message: message.into(),
        }
    }
}

/// Failure inside a single production. These never abort a parse; the
/// production contributes nothing and the failure is recorded as a diagnostic.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("cannot load stylesheet {url}: {source}")]
    Load {
        url: String,
        #[source]
        source: LoadError,
    },

    #[error("stylesheet {url} does not parse: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("import cycle through {0}")]
    ImportCycle(String),

    #[error("imports nested deeper than {0} levels")]
    ImportDepth(usize),

    #[error("at-rule @{0} ignored")]
    IgnoredAtRule(String),
}

/// Kind of a stylesheet discovery problem found in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StylesheetErrorKind {
    /// A stylesheet of a type other than `text/css` was declared.
    UnknownStylesheetType,
    /// A `style` attribute was used with no default stylesheet type declared.
    NoStylesheetType,
    /// A stylesheet could not be loaded or parsed.
    StylesheetParse,
}

/// How sure a reported problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Check,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description}")]
pub struct StylesheetError {
    pub kind: StylesheetErrorKind,
    pub node: Option<NodeId>,
    pub description: String,
    pub data: Option<String>,
}

impl StylesheetError {
    pub fn unknown_type(node: Option<NodeId>, description: &str, data: impl Into<String>) -> Self {
        StylesheetError {
            kind: StylesheetErrorKind::UnknownStylesheetType,
            node,
            description: description.to_string(),
            data: Some(data.into()),
        }
    }

    pub fn no_type(node: NodeId, data: impl Into<String>) -> Self {
        StylesheetError {
            kind: StylesheetErrorKind::NoStylesheetType,
            node: Some(node),
            description: "Style without stylesheet type defined".to_string(),
            data: Some(data.into()),
        }
    }

    pub fn parse(node: Option<NodeId>, data: impl Into<String>) -> Self {
        StylesheetError {
            kind: StylesheetErrorKind::StylesheetParse,
            node,
            description: "Parse error in stylesheet".to_string(),
            data: Some(data.into()),
        }
    }

    /// A missing stylesheet type is a definite error; the rest need a human
    /// to look at the page.
    pub fn severity(&self) -> Severity {
        match self.kind {
            StylesheetErrorKind::NoStylesheetType => Severity::Error,
            StylesheetErrorKind::UnknownStylesheetType | StylesheetErrorKind::StylesheetParse => {
                Severity::Check
            }
        }
    }
}
