//! Extractor system for structural queries over downloaded markup
//!
//! Design: an extractor is bound to one expression when it is created and
//! turns a byte buffer into serialized matches in document order.

mod xpath;

pub use xpath::XPathExtractor;

use crate::error::ExtractError;

/// Creates an extractor bound to an expression
pub type ExtractorFactory = Box<dyn Fn(&str) -> Box<dyn Extractor> + Send + Sync>;

/// Trait for markup extractors
///
/// An empty result is a successful parse, not an error.
pub trait Extractor: Send + Sync {
    /// Identifier for logging
    fn name(&self) -> &'static str;

    /// Parse `content` and serialize every match, in document order
    fn parse(&self, content: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Factory producing [`XPathExtractor`]s
pub fn xpath_extractor_factory() -> ExtractorFactory {
    Box::new(|expression: &str| -> Box<dyn Extractor> {
        Box::new(XPathExtractor::new(expression))
    })
}
