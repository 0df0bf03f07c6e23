//! Live catalog of destination names known to the classifier
//!
//! The catalog decides whether a backtick line is a real command. It holds the
//! declaration keywords (fixed for a session) and the destination names that
//! have been declared on the wire or registered by the host.

use crate::domain::types::DestinationName;
use std::collections::BTreeSet;

/// Result of looking up the first token of a backtick line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenClass {
    /// A declaration keyword such as `TERM`
    Keyword,
    /// A destination already in the catalog
    Destination(DestinationName),
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct DestinationCatalog {
    keywords: Vec<String>,
    names: BTreeSet<DestinationName>,
}

impl DestinationCatalog {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_ascii_uppercase())
                .collect(),
            names: BTreeSet::new(),
        }
    }

    /// Keywords compare case-insensitively, names exactly
    pub fn classify(&self, token: &str) -> TokenClass {
        if self.is_keyword(token) {
            return TokenClass::Keyword;
        }
        match DestinationName::try_new(token) {
            Ok(name) if self.names.contains(&name) => TokenClass::Destination(name),
            _ => TokenClass::Unknown,
        }
    }

    pub fn is_keyword(&self, token: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(token))
    }

    /// Add a name declared on the wire; returns whether it was new
    pub fn declare(&mut self, name: DestinationName) -> bool {
        self.names.insert(name)
    }

    /// Add a name registered by the host; returns whether it was new
    pub fn register(&mut self, name: DestinationName) -> bool {
        self.names.insert(name)
    }

    pub fn deregister(&mut self, name: &DestinationName) -> bool {
        self.names.remove(name)
    }

    pub fn contains(&self, name: &DestinationName) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &DestinationName> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
