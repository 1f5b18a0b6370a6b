//! Tool contract for htmlpluck

use crate::service::ExtractService;
use crate::types::{JobRequest, JobResponse};
use crate::{TOOL_DESCRIPTION, TOOL_LLMTXT};
use schemars::schema_for;

/// Configured htmlpluck tool
#[derive(Default)]
pub struct Tool {
    service: ExtractService,
}

impl Tool {
    /// Create a tool backed by a custom service
    pub fn with_service(service: ExtractService) -> Self {
        Self { service }
    }

    /// Get tool description
    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Get full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    /// Get input schema as JSON
    pub fn input_schema(&self) -> serde_json::Value {
        let schema = schema_for!(JobRequest);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// Get output schema as JSON
    pub fn output_schema(&self) -> serde_json::Value {
        let schema = schema_for!(JobResponse);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// Execute the tool with the given request
    pub async fn execute(&self, req: JobRequest) -> JobResponse {
        JobResponse::from(self.service.execute(req).await)
    }

    /// Execute the tool on a raw JSON request body, returning the response line
    pub async fn handle(&self, body: &[u8]) -> serde_json::Result<Vec<u8>> {
        self.service.handle(body).await
    }
}
