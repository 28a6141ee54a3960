//! HTTP adapter over the core: thin handlers that deserialize a request,
//! run the CPU-bound work on a blocking worker, and translate the two
//! error kinds into client/server status codes.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::core::model::LayerAttention;
use crate::core::reduce::{ReductionEngine, ReductionMethod};
use crate::envconfig::EnvConfig;
use crate::error::{ModelError, ReductionError};
use crate::manager::ModelManager;

pub const DEFAULT_MODEL: &str = "bert-base-uncased";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ModelManager>,
    pub engine: ReductionEngine,
}

#[derive(Debug, Deserialize)]
pub struct TokenizeRequest {
    pub text: String,
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenizeResponse {
    pub tokens: Vec<String>,
    pub model_name: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingsRequest {
    pub text: String,
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingsResponse {
    pub tokens: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub model_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AttentionRequest {
    pub text: String,
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttentionResponse {
    pub tokens: Vec<String>,
    pub attention: Vec<LayerAttention>,
    pub model_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReduceRequest {
    pub text: String,
    pub model_name: Option<String>,
    pub reduction_method: Option<String>,
    pub n_components: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReduceResponse {
    pub tokens: Vec<String>,
    pub reduced_embeddings: Vec<Vec<f32>>,
    pub model_name: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn serve(config: EnvConfig) -> anyhow::Result<()> {
    let state = AppState {
        manager: Arc::new(ModelManager::new(
            &config.models_dir,
            config.max_loaded_models,
        )),
        engine: ReductionEngine::new(config.reduction_seed),
    };

    let addr = format!("{}:{}", config.host.host, config.host.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("tracelens listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tokenize", post(tokenize))
        .route("/api/embeddings", post(embeddings))
        .route("/api/attention", post(attention))
        .route("/api/reduce", post(reduce))
        .route("/api/models", get(list_models))
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .with_state(state)
}

async fn tokenize(
    State(state): State<AppState>,
    Json(req): Json<TokenizeRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let model_name = req.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    tracing::info!(%request_id, model = %model_name, "tokenize request");

    let manager = Arc::clone(&state.manager);
    let name = model_name.clone();
    match run_blocking(move || manager.tokenize_only(&req.text, &name)).await {
        Ok(tokens) => {
            tracing::info!(%request_id, tokens_count = tokens.len(), "tokenize response");
            Json(TokenizeResponse { tokens, model_name }).into_response()
        }
        Err(resp) => resp,
    }
}

async fn embeddings(
    State(state): State<AppState>,
    Json(req): Json<EmbeddingsRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let model_name = req.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    tracing::info!(%request_id, model = %model_name, "embeddings request");

    let manager = Arc::clone(&state.manager);
    let name = model_name.clone();
    let pass = run_blocking(move || manager.get_service(&name)?.embed_and_attend(&req.text)).await;
    match pass {
        Ok(pass) => {
            tracing::info!(
                %request_id,
                tokens_count = pass.tokens.len(),
                hidden_size = pass.hidden_states.width(),
                "embeddings response"
            );
            Json(EmbeddingsResponse {
                tokens: pass.tokens,
                embeddings: pass.hidden_states.to_rows(),
                model_name,
            })
            .into_response()
        }
        Err(resp) => resp,
    }
}

async fn attention(
    State(state): State<AppState>,
    Json(req): Json<AttentionRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let model_name = req.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    tracing::info!(%request_id, model = %model_name, "attention request");

    let manager = Arc::clone(&state.manager);
    let name = model_name.clone();
    let pass = run_blocking(move || manager.get_service(&name)?.embed_and_attend(&req.text)).await;
    match pass {
        Ok(pass) => {
            tracing::info!(
                %request_id,
                tokens_count = pass.tokens.len(),
                attention_layers = pass.attentions.len(),
                "attention response"
            );
            Json(AttentionResponse {
                tokens: pass.tokens,
                attention: pass.attentions,
                model_name,
            })
            .into_response()
        }
        Err(resp) => resp,
    }
}

async fn reduce(State(state): State<AppState>, Json(req): Json<ReduceRequest>) -> Response {
    let request_id = Uuid::new_v4();
    let model_name = req.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let method_name = req.reduction_method.unwrap_or_else(|| "pca".to_string());
    let n_components = req.n_components.unwrap_or(2);
    tracing::info!(
        %request_id,
        model = %model_name,
        method = %method_name,
        n_components,
        "reduce request"
    );

    let method = match method_name.parse::<ReductionMethod>() {
        Ok(method) => method,
        Err(e) => return reduction_error(&e),
    };

    let manager = Arc::clone(&state.manager);
    let engine = state.engine;
    let name = model_name.clone();
    let result = run_blocking(move || {
        let pass = manager.get_service(&name)?.embed_and_attend(&req.text)?;
        Ok((pass.tokens, engine.reduce(&pass.hidden_states, method, n_components)))
    })
    .await;
    match result {
        Ok((tokens, Ok(reduced_embeddings))) => {
            tracing::info!(
                %request_id,
                tokens_count = tokens.len(),
                n_components,
                "reduce response"
            );
            Json(ReduceResponse {
                tokens,
                reduced_embeddings,
                model_name,
            })
            .into_response()
        }
        Ok((_, Err(e))) => reduction_error(&e),
        Err(resp) => resp,
    }
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.manager.list_keys(),
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Runs a core operation on a blocking worker so one slow forward pass
/// never stalls the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(model_error(&e)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("worker failed: {}", e),
            }),
        )
            .into_response()),
    }
}

fn model_error(e: &ModelError) -> Response {
    let status = match e {
        ModelError::Load { .. } => StatusCode::BAD_REQUEST,
        ModelError::Inference { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(error = %e, "request failed");
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn reduction_error(e: &ReductionError) -> Response {
    tracing::error!(error = %e, "request failed");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_default_their_optional_fields() {
        let req: ReduceRequest = serde_json::from_str(r#"{"text": "Hello world"}"#).unwrap();
        assert_eq!(req.model_name, None);
        assert_eq!(req.reduction_method, None);
        assert_eq!(req.n_components, None);

        let req: TokenizeRequest =
            serde_json::from_str(r#"{"text": "hi", "model_name": "custom"}"#).unwrap();
        assert_eq!(req.model_name.as_deref(), Some("custom"));
    }

    #[test]
    fn responses_serialize_with_wire_names() {
        let resp = ReduceResponse {
            tokens: vec!["a".to_string()],
            reduced_embeddings: vec![vec![0.5, -0.5]],
            model_name: "stub".to_string(),
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("reduced_embeddings").is_some());
        assert!(value.get("model_name").is_some());
    }
}
