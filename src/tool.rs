// THEORY:
// `tool` is the remote-callable face of the analysis: a JSON request in, a JSON
// envelope out. Whatever happens, the caller gets a `ToolResponse`. Fatal errors
// become `success = false` with a message and a suggested next step; they never
// panic and never leak as transport errors.

use crate::config::AnalysisConfig;
use crate::core_modules::synthetic::SyntheticConfig;
use crate::error::{AnalysisError, ErrorReport};
use crate::pipeline::{AnalysisResult, analyze_case, analyze_synthetic};
use crate::report::summarize;
use serde::{Deserialize, Serialize};

/// One analysis request. Exactly one of `case_directory` and `synthetic` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    pub case_directory: Option<String>,
    /// Run the labelled synthetic demonstration instead of reading a case.
    pub synthetic: Option<SyntheticConfig>,
    /// Defaults to `AnalysisConfig::default()` for cases and
    /// `AnalysisConfig::demonstration()` for synthetic runs.
    pub config: Option<AnalysisConfig>,
    /// Leave the full result out of the response.
    pub summary_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl ToolResponse {
    fn success(result: AnalysisResult, summary_only: bool) -> Self {
        let summary = summarize(&result);
        Self { success: true, result: (!summary_only).then_some(result), summary: Some(summary), error: None }
    }

    fn failure(err: &AnalysisError) -> Self {
        Self { success: false, result: None, summary: None, error: Some(ErrorReport::from(err)) }
    }
}

pub async fn handle(request: AnalysisRequest) -> ToolResponse {
    match run(&request).await {
        Ok(result) => ToolResponse::success(result, request.summary_only),
        Err(err) => ToolResponse::failure(&err),
    }
}

/// Parses a JSON request and answers with a JSON response.
pub async fn handle_json(request: &str) -> String {
    let response = match serde_json::from_str::<AnalysisRequest>(request) {
        Ok(request) => handle(request).await,
        Err(e) => ToolResponse::failure(&AnalysisError::Configuration(format!("malformed request: {e}"))),
    };
    serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
        format!(r#"{{"success":false,"error":{{"kind":"internal_error","message":"cannot encode response: {e}"}}}}"#)
    })
}

async fn run(request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
    match (&request.case_directory, &request.synthetic) {
        (Some(case), None) => {
            let config = request.config.clone().unwrap_or_default();
            analyze_case(case, &config).await
        }
        (None, Some(synthetic)) => {
            let config = request.config.clone().unwrap_or_else(AnalysisConfig::demonstration);
            analyze_synthetic(synthetic.clone(), &config).await
        }
        (Some(_), Some(_)) => Err(AnalysisError::Configuration(
            "a request names either case_directory or synthetic, not both".into(),
        )),
        (None, None) => Err(AnalysisError::Configuration("a request needs case_directory or synthetic".into())),
    }
}
