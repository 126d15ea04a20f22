//! Selector AST, specificity weights and matching against the document tree.
//!
//! Selectors are built once by the parser and matched many times. Composite
//! selectors store their weight at construction, so `weight()` is O(1) and the
//! weight of a composite is always the sum of its parts.

use std::fmt;
use std::ops::{Add, AddAssign};

use string_cache::DefaultAtom;

use crate::dom::{Document, NodeId};

/// Specificity as (id count, attribute/class/pseudo count, type count),
/// compared left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Weight(pub u32, pub u32, pub u32);

impl Add for Weight {
    type Output = Weight;

    fn add(self, rhs: Weight) -> Weight {
        Weight(self.0 + rhs.0, self.1 + rhs.1, self.2 + rhs.2)
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, rhs: Weight) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Weight {
        iter.fold(Weight::default(), Add::add)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrOperator {
    /// `[name]`: present and non-empty.
    Present,
    /// `[name=value]`
    Equals,
    /// `[name~=value]`: one of the space separated words.
    SpaceList,
    /// `[name|=value]`: one of the comma separated items.
    CommaList,
}

/// How an attribute selector was written. `#id` is the only form that lands
/// in the id tier of the weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrSyntax {
    Bracket,
    Hash,
    Dot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSelector {
    pub name: DefaultAtom,
    pub operator: AttrOperator,
    pub value: Option<String>,
    pub syntax: AttrSyntax,
}

impl AttributeSelector {
    fn matches(&self, document: &Document, node: NodeId) -> bool {
        let Some(actual) = document.attr(node, &self.name) else {
            return false;
        };
        let expected = self.value.as_deref().unwrap_or_default();
        match self.operator {
            AttrOperator::Present => !actual.is_empty(),
            AttrOperator::Equals => actual == expected,
            AttrOperator::SpaceList => actual.split_ascii_whitespace().any(|v| v == expected),
            AttrOperator::CommaList => actual.split(',').any(|v| v.trim() == expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PseudoSelector {
    pub name: DefaultAtom,
    pub args: Vec<String>,
}

impl PseudoSelector {
    fn matches(&self, document: &Document, node: NodeId) -> bool {
        match &*self.name {
            "first-child" => document.prev_sibling(node).is_none(),
            "link" | "visited" => matches!(document.name(node), Some("a" | "link")),
            // Interaction state cannot be known statically.
            "hover" | "active" | "focus" => true,
            "lang" => document
                .attr(node, "lang")
                .is_some_and(|lang| self.args.iter().any(|arg| arg == lang)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
    /// `a + b`
    AdjacentSibling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSelector {
    /// Matched against an ancestor, the parent or the previous sibling.
    pub left: Selector,
    /// Matched against the node itself.
    pub right: Selector,
    pub combinator: Combinator,
    weight: Weight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Type(DefaultAtom),
    Universal,
    Attribute(AttributeSelector),
    Pseudo(PseudoSelector),
    Combined(Box<CombinedSelector>),
    /// Conjunction: every member must match the same node.
    Set(Vec<Selector>, Weight),
}

impl Selector {
    pub fn type_selector(name: &str) -> Self {
        Selector::Type(DefaultAtom::from(name.to_ascii_lowercase()))
    }

    pub fn attribute(name: &str, operator: AttrOperator, value: Option<&str>) -> Self {
        Selector::Attribute(AttributeSelector {
            name: DefaultAtom::from(name.to_ascii_lowercase()),
            operator,
            value: value.map(str::to_string),
            syntax: AttrSyntax::Bracket,
        })
    }

    pub fn id(value: &str) -> Self {
        Selector::Attribute(AttributeSelector {
            name: DefaultAtom::from("id"),
            operator: AttrOperator::Equals,
            value: Some(value.to_string()),
            syntax: AttrSyntax::Hash,
        })
    }

    pub fn class(value: &str) -> Self {
        Selector::Attribute(AttributeSelector {
            name: DefaultAtom::from("class"),
            operator: AttrOperator::SpaceList,
            value: Some(value.to_string()),
            syntax: AttrSyntax::Dot,
        })
    }

    pub fn pseudo(name: &str, args: Vec<String>) -> Self {
        Selector::Pseudo(PseudoSelector {
            name: DefaultAtom::from(name.to_ascii_lowercase()),
            args,
        })
    }

    pub fn combine(left: Selector, combinator: Combinator, right: Selector) -> Self {
        let weight = left.weight() + right.weight();
        Selector::Combined(Box::new(CombinedSelector {
            left,
            right,
            combinator,
            weight,
        }))
    }

    /// Conjunction of `members`; a single member is returned unchanged.
    pub fn set(members: impl IntoIterator<Item = Selector>) -> Self {
        let mut members: Vec<Selector> = members.into_iter().collect();
        if members.len() == 1 {
            if let Some(only) = members.pop() {
                return only;
            }
        }
        let weight = members.iter().map(Selector::weight).sum();
        Selector::Set(members, weight)
    }

    pub fn weight(&self) -> Weight {
        match self {
            Selector::Type(_) => Weight(0, 0, 1),
            Selector::Universal => Weight(0, 0, 0),
            Selector::Attribute(attr) if attr.syntax == AttrSyntax::Hash => Weight(1, 0, 0),
            Selector::Attribute(_) | Selector::Pseudo(_) => Weight(0, 1, 0),
            Selector::Combined(combined) => combined.weight,
            Selector::Set(_, weight) => *weight,
        }
    }

    pub fn matches(&self, document: &Document, node: NodeId) -> bool {
        match self {
            Selector::Type(name) => document.name(node) == Some(&**name),
            Selector::Universal => true,
            Selector::Attribute(attr) => attr.matches(document, node),
            Selector::Pseudo(pseudo) => pseudo.matches(document, node),
            Selector::Combined(combined) => {
                if !combined.right.matches(document, node) {
                    return false;
                }
                match combined.combinator {
                    Combinator::Descendant => {
                        let mut ancestor = document.parent(node);
                        while let Some(a) = ancestor {
                            if combined.left.matches(document, a) {
                                return true;
                            }
                            ancestor = document.parent(a);
                        }
                        false
                    }
                    Combinator::Child => document
                        .parent(node)
                        .is_some_and(|p| combined.left.matches(document, p)),
                    Combinator::AdjacentSibling => document
                        .prev_sibling(node)
                        .is_some_and(|s| combined.left.matches(document, s)),
                }
            }
            Selector::Set(members, _) => members.iter().all(|s| s.matches(document, node)),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Type(name) => cssparser::serialize_identifier(name, f),
            Selector::Universal => f.write_str("*"),
            Selector::Attribute(attr) => match (attr.syntax, attr.value.as_deref()) {
                (AttrSyntax::Hash, Some(value)) => {
                    f.write_str("#")?;
                    cssparser::serialize_name(value, f)
                }
                (AttrSyntax::Dot, Some(value)) => {
                    f.write_str(".")?;
                    cssparser::serialize_identifier(value, f)
                }
                (_, value) => {
                    f.write_str("[")?;
                    cssparser::serialize_identifier(&attr.name, f)?;
                    if let Some(value) = value {
                        f.write_str(match attr.operator {
                            AttrOperator::Present | AttrOperator::Equals => "=",
                            AttrOperator::SpaceList => "~=",
                            AttrOperator::CommaList => "|=",
                        })?;
                        cssparser::serialize_string(value, f)?;
                    }
                    f.write_str("]")
                }
            },
            Selector::Pseudo(pseudo) => {
                f.write_str(":")?;
                cssparser::serialize_identifier(&pseudo.name, f)?;
                if !pseudo.args.is_empty() {
                    write!(f, "({})", pseudo.args.join(", "))?;
                }
                Ok(())
            }
            Selector::Combined(combined) => {
                let sep = match combined.combinator {
                    Combinator::Descendant => " ",
                    Combinator::Child => " > ",
                    Combinator::AdjacentSibling => " + ",
                };
                write!(f, "{}{}{}", combined.left, sep, combined.right)
            }
            Selector::Set(members, _) => {
                for member in members {
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}
