//! Handlers for synchronous image generation.
//!
//! Routes:
//! - `POST /api/generate`: run a workflow, respond per `responseKind` (default URL)
//! - `POST /api/generate_file`: run a workflow, respond with the PNG bytes

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use comfy_sync_comfyui::job::JobRequest;
use comfy_sync_core::error::CoreError;
use comfy_sync_core::types::ResponseKind;
use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};
use crate::response;
use crate::state::AppState;

/// Request body shared by both generation endpoints.
///
/// Field names are camelCase; the older `workflow_data` /
/// `output_node_id` names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Workflow graph forwarded verbatim to the backend.
    #[serde(alias = "workflow_data")]
    pub job_spec: serde_json::Value,
    /// Node whose output image is returned. Numeric strings are accepted.
    #[serde(alias = "output_node_id", deserialize_with = "node_id")]
    pub target_node_id: i64,
    #[serde(default)]
    pub response_kind: Option<ResponseKind>,
}

impl GenerateRequest {
    /// Validate and convert into a job request.
    ///
    /// `default_kind` applies when the body names no response kind.
    pub fn into_job_request(self, default_kind: ResponseKind) -> Result<JobRequest, CoreError> {
        match &self.job_spec {
            serde_json::Value::Object(map) if !map.is_empty() => {}
            serde_json::Value::Object(_) => {
                return Err(CoreError::Validation("jobSpec must not be empty".into()));
            }
            _ => {
                return Err(CoreError::Validation("jobSpec must be a JSON object".into()));
            }
        }
        if self.target_node_id < 0 {
            return Err(CoreError::Validation(format!(
                "targetNodeId must be non-negative, got {}",
                self.target_node_id
            )));
        }

        Ok(JobRequest {
            workflow: self.job_spec,
            target_node_id: self.target_node_id,
            response_kind: self.response_kind.unwrap_or(default_kind),
        })
    }
}

/// POST /api/generate
///
/// Blocks until the job finishes and responds with `{ "url": ... }`, or
/// with the image bytes when the body asks for `"responseKind": "file"`.
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = parse(payload)?.into_job_request(ResponseKind::Url)?;
    run(&state, request).await
}

/// POST /api/generate_file
///
/// Blocks until the job finishes and responds with the PNG bytes. The
/// stored URL, if any, is returned in the `X-Image-Url` header.
pub async fn generate_file(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let mut request = parse(payload)?.into_job_request(ResponseKind::File)?;
    request.response_kind = ResponseKind::File;
    run(&state, request).await
}

async fn run(state: &AppState, request: JobRequest) -> AppResult<Response> {
    let snapshot = state.coordinator.run(request).await?;
    tracing::info!(
        job_id = %snapshot.id,
        response_kind = snapshot.response_kind.as_str(),
        "Job completed",
    );
    Ok(response::respond(snapshot)?)
}

fn parse(payload: Result<Json<GenerateRequest>, JsonRejection>) -> AppResult<GenerateRequest> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn node_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid node id '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn parse_body(body: serde_json::Value) -> GenerateRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn camel_case_body() {
        let request = parse_body(json!({
            "jobSpec": {"9": {"class_type": "SaveImageWebsocket"}},
            "targetNodeId": 9,
            "responseKind": "file",
        }));
        assert_eq!(request.target_node_id, 9);
        assert_eq!(request.response_kind, Some(ResponseKind::File));
    }

    #[test]
    fn legacy_field_names() {
        let request = parse_body(json!({
            "workflow_data": {"9": {}},
            "output_node_id": "12",
        }));
        assert_eq!(request.target_node_id, 12);
        assert!(request.response_kind.is_none());
    }

    #[test]
    fn default_kind_applies_when_absent() {
        let request = parse_body(json!({"jobSpec": {"1": {}}, "targetNodeId": 1}));
        let job = request.into_job_request(ResponseKind::Url).unwrap();
        assert_eq!(job.response_kind, ResponseKind::Url);
    }

    #[test]
    fn non_numeric_node_id_is_rejected() {
        let result: Result<GenerateRequest, _> =
            serde_json::from_value(json!({"jobSpec": {"1": {}}, "targetNodeId": "abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn empty_or_non_object_job_spec_is_invalid() {
        for job_spec in [json!({}), json!([1, 2]), json!("prompt")] {
            let request = parse_body(json!({"jobSpec": job_spec, "targetNodeId": 1}));
            assert_matches!(
                request.into_job_request(ResponseKind::Url),
                Err(CoreError::Validation(_))
            );
        }
    }

    #[test]
    fn negative_node_id_is_invalid() {
        let request = parse_body(json!({"jobSpec": {"1": {}}, "targetNodeId": -1}));
        assert_matches!(
            request.into_job_request(ResponseKind::Url),
            Err(CoreError::Validation(_))
        );
    }
}
