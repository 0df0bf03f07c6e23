//! Two-tier message classification
//!
//! Tier one ([`patterns`], [`elements`]) recognizes message layouts in the
//! unread bytes of a ring without consuming them. Tier two ([`validator`])
//! decides what a structural match means. The [`engine`] drives both.

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod elements;
pub mod engine;
pub mod patterns;
pub mod validator;

pub use catalog::{DestinationCatalog, TokenClass};
pub use checksum::{AdditiveChecksum, FnChecksum, PacketChecksum};
pub use self::config::ClassifierConfig;
pub use elements::{Element, Endian, Field, LengthWidth, Matcher};
pub use engine::{Classifier, PassEnd, PassReport};
pub use patterns::{PatternCatalog, PatternDefinition, PatternMatch, ValidationRule};
pub use validator::{Validator, Verdict};
