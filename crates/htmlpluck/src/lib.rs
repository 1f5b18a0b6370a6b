//! htmlpluck - download an exact number of bytes over TCP and pluck HTML
//! fragments out of them with XPath
//!
//! A job is a small JSON request naming an address, a byte count and an
//! XPath expression. The [`ExtractService`] decodes and validates it, reads
//! exactly `content-length` bytes from the address, evaluates the
//! expression over the bytes and answers with a single JSON response.
//!
//! ## Capabilities
//!
//! Transport and extraction are pluggable through factories handed to
//! [`ExtractService::new`]:
//! - [`TcpDownloader`] - byte-exact reads over plain TCP with dial and read
//!   deadlines
//! - [`XPathExtractor`] - XPath 1.0 queries over HTML, matches serialized
//!   back to markup

pub mod downloaders;
mod duration;
mod error;
pub mod extractors;
mod service;
mod tool;
mod types;
pub mod xpath;

pub use downloaders::{
    tcp_downloader_factory, Downloader, DownloaderFactory, OnBytes, TcpDownloader,
};
pub use duration::{DurationParseError, JobDuration};
pub use error::{ErrorKind, ExtractError, JobError, ValidationError};
pub use extractors::{xpath_extractor_factory, Extractor, ExtractorFactory, XPathExtractor};
pub use service::ExtractService;
pub use tool::Tool;
pub use types::{validate_address, JobRequest, JobResponse};
pub use xpath::XPath;

use std::time::Duration;

/// Connect timeout used when a request does not set `dial-timeout`
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Read timeout used when a request does not set `read-timeout`
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Tool description for LLM consumption
pub const TOOL_DESCRIPTION: &str = r#"Reads an exact number of bytes from a TCP address and extracts HTML fragments with XPath.

- Byte-exact reads with dial and read timeouts
- XPath 1.0 node selection over HTML
- Matches returned as serialized markup in document order"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# htmlpluck Tool

Reads exactly `content-length` bytes from a TCP address, parses them as HTML
and returns every node matched by an XPath expression.

## Capabilities
- Plain TCP transport, no framing, no TLS
- Byte-exact reads: fewer bytes than requested is an error, extra bytes are ignored
- XPath 1.0 axes, predicates, unions, arithmetic and core functions
- Matches serialized back to markup with HTML entities unescaped
- Attribute matches come back wrapped in an element named after the attribute (`<href>/home</href>`)
- Void elements are self-closed (`<br/>`)

## Input Parameters
- `content-length` (required): Number of bytes to read, must be positive
- `address` (required): `ipv4:port` or `hostname:port` (port optional)
- `xpath-expression` (required): XPath expression selecting nodes
- `dial-timeout` (optional): Connect timeout, nanoseconds or duration string (default "1s")
- `read-timeout` (optional): Read timeout from the start of reading (default "1s")

## Output Fields
- `success`: True if every stage succeeded
- `error-message`: Message of the error that ended the job
- `nodes`: Matched fragments in document order (omitted when empty)

## Examples

### Extract list items
```json
{"content-length": 512, "address": "127.0.0.1:8080", "xpath-expression": "//ul/li"}
```

### Extract link targets with custom timeouts
```json
{"content-length": 4096, "address": "docs.internal:9000", "xpath-expression": "//a/@href", "dial-timeout": "250ms", "read-timeout": 2000000000}
```

## Error Handling
- Invalid requests fail before any connection is made
- Connection, read and XPath errors are returned as `error-message`
- A peer that closes before `content-length` bytes arrive is an error
"#;
