//! Error types for htmlpluck
//!
//! Every stage of a job fails with a [`JobError`]. The wire format only
//! carries [`JobError::message`]; callers that need to branch use
//! [`JobError::kind`].

use std::io;
use thiserror::Error;

/// Closed set of failure categories a job can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request body is not valid JSON or a field has the wrong shape
    Decode,
    /// Request decoded but failed validation
    Validation,
    /// TCP connection could not be established
    Dial,
    /// Fewer than `content-length` bytes arrived in time
    Read,
    /// The XPath extractor rejected the expression or the content
    Extraction,
}

/// Errors that can terminate a job
#[derive(Debug, Error)]
pub enum JobError {
    /// Request body could not be decoded
    #[error("{0}")]
    Decode(String),

    /// Request failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Failed to connect to the remote endpoint
    #[error("dial tcp {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Reading from the connection failed or hit the read deadline
    #[error("read tcp {connection}: {source}")]
    Read {
        connection: String,
        #[source]
        source: io::Error,
    },

    /// Peer closed the stream before `expected` bytes were received
    #[error("unexpected EOF: received {received} of {expected} bytes")]
    ShortRead { expected: u64, received: u64 },

    /// XPath extraction failed
    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

impl JobError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Decode(_) => ErrorKind::Decode,
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::Dial { .. } => ErrorKind::Dial,
            JobError::Read { .. } | JobError::ShortRead { .. } => ErrorKind::Read,
            JobError::Extraction(_) => ErrorKind::Extraction,
        }
    }

    /// Message surfaced in the `error-message` field
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Map a serde_json decode failure, using stream-decoder wording for
    /// premature end of input.
    pub(crate) fn from_json(err: serde_json::Error, input_is_blank: bool) -> Self {
        if err.is_eof() {
            if input_is_blank {
                return JobError::Decode("EOF".to_string());
            }
            return JobError::Decode("unexpected EOF".to_string());
        }
        JobError::Decode(err.to_string())
    }
}

/// Request validation failures, reported in check order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input validation error: zero content-length value")]
    ZeroContentLength,

    #[error("input validation error: empty address")]
    EmptyAddress,

    #[error("input validation error: invalid address")]
    InvalidAddress,

    #[error("input validation error: empty xpath expression")]
    EmptyXPathExpression,
}

/// Errors raised while compiling or evaluating an XPath expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("xpath: empty expression")]
    EmptyExpression,

    #[error("xpath: {message} at offset {offset} in {expression:?}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("xpath: expression must evaluate to a node-set")]
    NotNodeSet,

    #[error("xpath: {0}")]
    Evaluation(String),
}
