//! XPath extractor

use crate::error::ExtractError;
use crate::extractors::Extractor;
use crate::xpath::XPath;
use tracing::debug;

/// Extractor evaluating an XPath expression against an HTML document
///
/// The expression is compiled on every `parse`, so an invalid expression
/// surfaces as that call's error.
#[derive(Debug, Clone)]
pub struct XPathExtractor {
    expression: String,
}

impl XPathExtractor {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl Extractor for XPathExtractor {
    fn name(&self) -> &'static str {
        "xpath"
    }

    fn parse(&self, content: &[u8]) -> Result<Vec<String>, ExtractError> {
        let xpath = XPath::compile(&self.expression)?;
        let html = String::from_utf8_lossy(content);
        let nodes = xpath.select(&html)?;
        debug!(expression = %self.expression, matches = nodes.len(), "Extracted nodes");
        Ok(nodes)
    }
}
