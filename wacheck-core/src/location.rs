//! Locations of documents and stylesheets, and the loaders that fetch them.
//!
//! The core never talks to the network itself. Everything it needs from the
//! outside world goes through `ResourceLoader`; this module provides an
//! in-memory loader (tests, embedding) and a `file:` loader.

use std::collections::HashMap;
use std::path::Path;

use encoding_rs::Encoding;
use url::Url;

use crate::ResourceLoader;
use crate::error::LoadError;

/// A URL, optionally with an explicitly declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Url,
    mime_type: Option<(String, String)>,
}

impl Location {
    pub fn parse(url: &str) -> Result<Self, LoadError> {
        let parsed = Url::parse(url).map_err(|source| LoadError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Location {
            url: parsed,
            mime_type: None,
        })
    }

    pub fn from_file_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let url = Url::from_file_path(path).map_err(|_| LoadError::InvalidPath(path.to_path_buf()))?;
        Ok(Location {
            url,
            mime_type: None,
        })
    }

    /// Resolves `href` against this location. Absolute URLs are taken as-is.
    pub fn make_location(&self, href: &str, mime_type: Option<&str>) -> Result<Self, LoadError> {
        let url = self.url.join(href.trim()).map_err(|source| LoadError::InvalidUrl {
            url: href.to_string(),
            source,
        })?;
        Ok(Location {
            url,
            mime_type: mime_type.and_then(split_mime_type),
        })
    }

    /// Resolves `href` against `base` when there is one.
    pub fn resolve(base: Option<&Location>, href: &str) -> Result<Self, LoadError> {
        match base {
            Some(base) => base.make_location(href, None),
            None => Location::parse(href.trim()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Declared MIME type, or one guessed from the path extension.
    pub fn mime_type(&self) -> Option<(&str, &str)> {
        if let Some((major, minor)) = &self.mime_type {
            return Some((major.as_str(), minor.as_str()));
        }
        let path = self.url.path();
        let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext.to_ascii_lowercase().as_str() {
            "css" => Some(("text", "css")),
            "html" | "htm" => Some(("text", "html")),
            "xhtml" => Some(("application", "xhtml+xml")),
            _ => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn split_mime_type(mime: &str) -> Option<(String, String)> {
    let essence = mime.split(';').next()?.trim();
    let (major, minor) = essence.split_once('/')?;
    if major.is_empty() || minor.is_empty() {
        return None;
    }
    Some((major.to_ascii_lowercase(), minor.to_ascii_lowercase()))
}

/// A fetched body together with the headers it was served with.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl Resource {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Resource {
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `charset` parameter of the `Content-Type` header.
    pub fn charset(&self) -> Option<&str> {
        let content_type = self.header("content-type")?;
        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// Decodes the body. A byte order mark wins over the declared charset;
    /// without either the body is taken as UTF-8.
    pub fn text(&self) -> String {
        let encoding = self
            .charset()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (text, _, _) = encoding.decode(&self.body);
        text.into_owned()
    }
}

/// Serves resources registered up front, keyed by absolute URL.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    resources: HashMap<String, Resource>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, resource: Resource) {
        let key = Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        self.resources.insert(key, resource);
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.insert(url, Resource::new(body));
        self
    }
}

impl ResourceLoader for MemoryLoader {
    fn fetch(&self, location: &Location) -> Result<Resource, LoadError> {
        tracing::debug!("Fetching {} from memory", location);
        self.resources
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(location.to_string()))
    }
}

/// Reads `file:` URLs from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl ResourceLoader for FileLoader {
    fn fetch(&self, location: &Location) -> Result<Resource, LoadError> {
        let url = location.url();
        if url.scheme() != "file" {
            return Err(LoadError::UnsupportedScheme(url.scheme().to_string()));
        }
        let path = url
            .to_file_path()
            .map_err(|_| LoadError::NotFound(location.to_string()))?;
        tracing::debug!("Reading {}", path.display());
        let body = std::fs::read(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(location.to_string()),
            _ => LoadError::Io(err),
        })?;
        let mut resource = Resource::new(body);
        if let Some((major, minor)) = location.mime_type() {
            resource = resource.with_header("Content-Type", &format!("{major}/{minor}"));
        }
        Ok(resource)
    }
}
