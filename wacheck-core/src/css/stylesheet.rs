//! Stylesheets as ordered lists of media-scoped rule sets, and per-node
//! property resolution.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use string_cache::DefaultAtom;

use super::selector::{Selector, Weight};
use crate::dom::{Document, NodeId};

/// Media names a rule set is restricted to. Empty means every medium.
pub type MediaList = SmallVec<[DefaultAtom; 2]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: DefaultAtom,
    pub value: String,
    pub important: bool,
}

impl Property {
    pub fn new(name: &str, value: &str, important: bool) -> Self {
        Property {
            name: DefaultAtom::from(name.to_ascii_lowercase()),
            value: value.to_string(),
            important,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)?;
        if self.important {
            f.write_str(" !important")?;
        }
        Ok(())
    }
}

/// One selector with its declarations. The alternatives of a selector list
/// become separate rules sharing a single declaration list.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: Selector,
    pub properties: Rc<[Property]>,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.selector)?;
        for (i, property) in self.properties.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{property}")?;
        }
        f.write_str(" }")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaRules {
    pub media: MediaList,
    pub rules: Vec<Rule>,
}

impl MediaRules {
    pub fn applies_to(&self, medium: &str) -> bool {
        self.media.is_empty() || self.media.iter().any(|m| &**m == medium)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stylesheet {
    entries: Vec<MediaRules>,
}

impl Stylesheet {
    pub fn new(entries: Vec<MediaRules>) -> Self {
        Stylesheet { entries }
    }

    pub fn media_rules(&self) -> &[MediaRules] {
        &self.entries
    }

    pub fn push(&mut self, entry: MediaRules) {
        self.entries.push(entry);
    }

    /// Appends `other` after this sheet's own entries.
    pub fn extend(&mut self, other: Stylesheet) {
        self.entries.extend(other.entries);
    }

    /// Number of rules across all media entries.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.entries.iter().flat_map(|e| e.rules.iter())
    }

    pub fn merge(&self, other: &Stylesheet) -> Stylesheet {
        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        entries.extend_from_slice(&self.entries);
        entries.extend_from_slice(&other.entries);
        Stylesheet { entries }
    }

    /// Narrows every entry to `media`. Entries for all media take exactly
    /// `media`; entries for specific media keep the intersection and are
    /// dropped when it is empty. An empty `media` leaves the sheet as is.
    pub fn restrict_to_media(&mut self, media: &[DefaultAtom]) {
        if media.is_empty() {
            return;
        }
        self.entries.retain_mut(|entry| {
            if entry.media.is_empty() {
                entry.media = media.iter().cloned().collect();
            } else {
                entry.media.retain(|m| media.contains(m));
            }
            !entry.media.is_empty()
        });
    }

    /// Resolves the properties this sheet gives `node` for `medium`.
    ///
    /// Rules are visited in sheet order. A rule whose selector also matches
    /// an ancestor of the node is skipped, as its contribution belongs to
    /// that ancestor. A property already set is only replaced by a rule of
    /// strictly greater weight, so among equal weights the earliest rule
    /// wins. `!important` breaks ties between equal weights.
    pub fn node_properties(&self, document: &Document, node: NodeId, medium: &str) -> PropertyMap {
        let mut map = PropertyMap::default();
        let mut ranks: Vec<(Weight, bool)> = Vec::new();

        for entry in self.entries.iter().filter(|e| e.applies_to(medium)) {
            for rule in &entry.rules {
                if !rule.selector.matches(document, node)
                    || matched_by_ancestor(&rule.selector, document, node)
                {
                    continue;
                }
                let weight = rule.selector.weight();
                for property in rule.properties.iter() {
                    let rank = (weight, property.important);
                    match map.position(&property.name) {
                        Some(i) if rank > ranks[i] => {
                            map.entries[i].1.clone_from(&property.value);
                            ranks[i] = rank;
                        }
                        Some(_) => {}
                        None => {
                            map.entries.push((property.name.clone(), property.value.clone()));
                            ranks.push(rank);
                        }
                    }
                }
            }
        }
        map
    }
}

fn matched_by_ancestor(selector: &Selector, document: &Document, node: NodeId) -> bool {
    let mut ancestor = document.parent(node);
    while let Some(a) = ancestor {
        if selector.matches(document, a) {
            return true;
        }
        ancestor = document.parent(a);
    }
    false
}

pub fn merge_stylesheets(first: &Stylesheet, second: &Stylesheet) -> Stylesheet {
    first.merge(second)
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            if entry.media.is_empty() {
                for rule in &entry.rules {
                    writeln!(f, "{rule}")?;
                }
            } else {
                let media: Vec<&str> = entry.media.iter().map(|m| &**m).collect();
                writeln!(f, "@media {} {{", media.join(", "))?;
                for rule in &entry.rules {
                    writeln!(f, "  {rule}")?;
                }
                writeln!(f, "}}")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolved properties
// ---------------------------------------------------------------------------

/// Property name to value, in the order names were first set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyMap {
    entries: Vec<(DefaultAtom, String)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name`, replacing any earlier value in place.
    pub fn insert(&mut self, name: DefaultAtom, value: String) {
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (&**k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &DefaultAtom) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == name)
    }
}

impl fmt::Display for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}
