//! Core types for htmlpluck

use crate::duration::JobDuration;
use crate::error::{JobError, ValidationError};
use crate::{DEFAULT_DIAL_TIMEOUT, DEFAULT_READ_TIMEOUT};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

const OCTET: &str = r"(25[0-5]|2[0-4][0-9]|[0-1]?[0-9]{1,2})";
const PORT: &str =
    r"(6553[0-5]|655[0-2][0-9]|65[0-4][0-9]{2}|6[0-4][0-9]{3}|[1-5][0-9]{4}|[1-9][0-9]{0,3}|0)";
const LABEL: &str = r"([0-9A-Za-z_]|[0-9A-Za-z_][0-9A-Za-z_\-]*[0-9A-Za-z_])";

static IPV4_PORT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"\A({OCTET}\.){{3}}{OCTET}(:{PORT})?\z")).ok()
});

static HOSTNAME_PORT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"\A({LABEL}\.)*{LABEL}(:{PORT})?\z")).ok()
});

/// Check an address against the `ipv4[:port]` and `hostname[:port]` forms
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }

    for re in [&*IPV4_PORT_RE, &*HOSTNAME_PORT_RE].into_iter().flatten() {
        if re.is_match(address) {
            return Ok(());
        }
    }

    Err(ValidationError::InvalidAddress)
}

/// One job: where to download from, how much, and what to extract
///
/// Every field is optional on the wire; missing values take their zero
/// value and are rejected by [`JobRequest::validate`], except the two
/// timeouts which fall back to one second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct JobRequest {
    /// Exact number of bytes to read from the connection (must be > 0)
    #[serde(default)]
    pub content_length: i64,

    /// Remote endpoint as `host:port`
    #[serde(default)]
    pub address: String,

    /// XPath expression selecting the nodes to return
    #[serde(default)]
    pub xpath_expression: String,

    /// Connect timeout (default 1s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dial_timeout: Option<JobDuration>,

    /// Read timeout, measured from the start of reading (default 1s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<JobDuration>,
}

impl JobRequest {
    /// Create a request with the required fields
    pub fn new(
        address: impl Into<String>,
        content_length: i64,
        xpath_expression: impl Into<String>,
    ) -> Self {
        Self {
            content_length,
            address: address.into(),
            xpath_expression: xpath_expression.into(),
            ..Default::default()
        }
    }

    /// Set the connect timeout
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout.into());
        self
    }

    /// Set the read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout.into());
        self
    }

    /// Decode the first JSON value in `body`; trailing bytes are ignored
    pub fn decode(body: &[u8]) -> Result<Self, JobError> {
        let blank = body.iter().all(u8::is_ascii_whitespace);
        let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<JobRequest>();
        match stream.next() {
            Some(Ok(request)) => Ok(request),
            Some(Err(err)) => Err(JobError::from_json(err, blank)),
            None => Err(JobError::Decode("EOF".to_string())),
        }
    }

    /// Validate in order: content-length, address, xpath-expression
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content_length <= 0 {
            return Err(ValidationError::ZeroContentLength);
        }

        validate_address(&self.address)?;

        if self.xpath_expression.is_empty() {
            return Err(ValidationError::EmptyXPathExpression);
        }

        Ok(())
    }

    /// Connect timeout with the default applied
    pub fn effective_dial_timeout(&self) -> Duration {
        self.dial_timeout
            .map(Duration::from)
            .unwrap_or(DEFAULT_DIAL_TIMEOUT)
    }

    /// Read timeout with the default applied
    pub fn effective_read_timeout(&self) -> Duration {
        self.read_timeout
            .map(Duration::from)
            .unwrap_or(DEFAULT_READ_TIMEOUT)
    }
}

/// Outcome of one job
///
/// Exactly one of `error_message` and `nodes` carries data. An empty
/// `nodes` list is omitted from the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct JobResponse {
    /// True iff no stage of the job failed
    pub success: bool,

    /// Message of the error that ended the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Serialized matches in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

impl JobResponse {
    /// Successful response carrying the matched fragments
    pub fn success(nodes: Vec<String>) -> Self {
        Self {
            success: true,
            error_message: None,
            nodes,
        }
    }

    /// Failed response carrying the error's message
    pub fn failure(err: &JobError) -> Self {
        Self {
            success: false,
            error_message: Some(err.message()),
            nodes: Vec::new(),
        }
    }

    /// Encode as a single JSON line
    pub fn to_json_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = serde_json::to_vec(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

impl From<Result<Vec<String>, JobError>> for JobResponse {
    fn from(result: Result<Vec<String>, JobError>) -> Self {
        match result {
            Ok(nodes) => JobResponse::success(nodes),
            Err(err) => JobResponse::failure(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn request(content_length: i64, address: &str, xpath: &str) -> JobRequest {
        JobRequest::new(address, content_length, xpath)
    }

    #[test]
    fn test_validate_accepts_ipv4_with_port() {
        assert_eq!(request(10, "127.0.0.1:8080", "//ul/li").validate(), Ok(()));
    }

    #[test]
    fn test_validate_accepts_hostname_without_port() {
        assert_eq!(request(10, "mydomain.zone", "//ul/li").validate(), Ok(()));
    }

    #[test]
    fn test_validate_zero_content_length() {
        assert_eq!(
            JobRequest::default().validate(),
            Err(ValidationError::ZeroContentLength)
        );
        assert_eq!(
            request(-1, "127.0.0.1:8080", "//li").validate(),
            Err(ValidationError::ZeroContentLength)
        );
    }

    #[test]
    fn test_validate_empty_address() {
        assert_eq!(
            request(10, "", "").validate(),
            Err(ValidationError::EmptyAddress)
        );
    }

    #[test]
    fn test_validate_invalid_addresses() {
        assert_eq!(
            request(10, "256.789.320.752:8135135368", "").validate(),
            Err(ValidationError::InvalidAddress)
        );
        assert_eq!(
            request(10, "gsfdsfdfd%@#fdfaf", "").validate(),
            Err(ValidationError::InvalidAddress)
        );
    }

    #[test]
    fn test_validate_empty_xpath() {
        assert_eq!(
            request(10, "127.0.0.1:8080", "").validate(),
            Err(ValidationError::EmptyXPathExpression)
        );
    }

    #[test]
    fn test_address_grammar() {
        for ok in [
            "127.0.0.1",
            "127.0.0.1:0",
            "10.0.0.255:65535",
            "localhost:80",
            "my-host.example.com:443",
            "a",
            "under_score.zone:1",
        ] {
            assert_eq!(validate_address(ok), Ok(()), "{ok}");
        }

        for bad in [
            "127.0.0.1:65536",
            "127.0.0.1:080",
            "-leading.zone",
            "trailing-.zone",
            "double..dot",
            "host:",
            ":8080",
            "host:port",
            "host:8080\nother",
            "http://host:80",
        ] {
            assert_eq!(
                validate_address(bad),
                Err(ValidationError::InvalidAddress),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_decode_full_request() {
        let body = br#"{"content-length":10,"address":"127.0.0.1:8080","xpath-expression":"//ul/li","dial-timeout":"2s","read-timeout":500000000}"#;
        let req = JobRequest::decode(body).unwrap();
        assert_eq!(req.content_length, 10);
        assert_eq!(req.address, "127.0.0.1:8080");
        assert_eq!(req.xpath_expression, "//ul/li");
        assert_eq!(req.effective_dial_timeout(), Duration::from_secs(2));
        assert_eq!(req.effective_read_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_decode_defaults_timeouts() {
        let req = JobRequest::decode(br#"{"content-length":10,"dial-timeout":null}"#).unwrap();
        assert_eq!(req.effective_dial_timeout(), DEFAULT_DIAL_TIMEOUT);
        assert_eq!(req.effective_read_timeout(), DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_decode_ignores_trailing_data() {
        let req = JobRequest::decode(b"{\"content-length\":3}\n{garbage").unwrap();
        assert_eq!(req.content_length, 3);
    }

    #[test]
    fn test_decode_empty_body() {
        let err = JobRequest::decode(b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.message(), "EOF");

        let err = JobRequest::decode(b"  \n").unwrap_err();
        assert_eq!(err.message(), "EOF");
    }

    #[test]
    fn test_decode_truncated_body() {
        let err = JobRequest::decode(br#"{"content-length":"#).unwrap_err();
        assert_eq!(err.message(), "unexpected EOF");
    }

    #[test]
    fn test_decode_invalid_duration() {
        let err = JobRequest::decode(br#"{"dial-timeout":{}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.message().starts_with("invalid duration"));
    }

    #[test]
    fn test_decode_wrong_field_type() {
        let err = JobRequest::decode(br#"{"content-length":"ten"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_response_success_keeps_markup_literal() {
        let resp = JobResponse::success(vec!["<li>blabla</li>".to_string()]);
        let line = resp.to_json_line().unwrap();
        assert_eq!(
            String::from_utf8(line.clone()).unwrap(),
            "{\"success\":true,\"nodes\":[\"<li>blabla</li>\"]}\n"
        );

        let decoded: JobResponse = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(decoded.nodes[0], "<li>blabla</li>");
    }

    #[test]
    fn test_response_omits_empty_nodes() {
        let json = serde_json::to_string(&JobResponse::success(Vec::new())).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[test]
    fn test_response_failure() {
        let err = JobError::from(ValidationError::ZeroContentLength);
        let json = serde_json::to_string(&JobResponse::failure(&err)).unwrap();
        assert_eq!(
            json,
            r#"{"success":false,"error-message":"input validation error: zero content-length value"}"#
        );
    }

    #[test]
    fn test_request_serialization_uses_kebab_case() {
        let req = JobRequest::new("127.0.0.1:8080", 10, "//li").dial_timeout(Duration::from_secs(2));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"content-length\":10"));
        assert!(json.contains("\"xpath-expression\":\"//li\""));
        assert!(json.contains("\"dial-timeout\":\"2s\""));
        assert!(!json.contains("read-timeout"));
    }
}
