//! Settings for stylesheet discovery and cascade resolution.

use string_cache::DefaultAtom;

/// The only stylesheet language the cascade understands.
pub const CSS_TYPE: &str = "text/css";

#[derive(Debug, Clone)]
pub struct Config {
    /// Media type the per-node properties are computed for.
    pub media: DefaultAtom,
    /// How many `@import` levels are followed before giving up.
    pub max_import_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            media: DefaultAtom::from("screen"),
            max_import_depth: 8,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, media: &str) -> Self {
        self.media = DefaultAtom::from(media.to_ascii_lowercase());
        self
    }

    pub fn with_max_import_depth(mut self, depth: usize) -> Self {
        self.max_import_depth = depth;
        self
    }
}
