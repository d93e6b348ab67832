use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::credentials::{resolve_script_credentials, CredentialUpdate};
use crate::error::{AppError, Result};
use crate::models::{ExportedScript, GenericResponse, UpdateCredentialRequest};

use super::super::state::AppState;

/// Stored values for every credential key the script references
pub async fn resolve_credentials(
    State(state): State<Arc<AppState>>,
    Json(script): Json<ExportedScript>,
) -> Result<Json<HashMap<String, String>>> {
    let resolved = resolve_script_credentials(state.credentials.as_ref(), &script)
        .await
        .map_err(|e| AppError::CredentialStore(e.to_string()))?;
    tracing::info!(
        "Resolved {} of {} credential(s)",
        resolved.len(),
        script.credential_keys().len()
    );
    Ok(Json(resolved))
}

pub async fn update_credential(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(request): Json<UpdateCredentialRequest>,
) -> Result<Json<GenericResponse>> {
    let updated = state
        .credentials
        .update_credential(CredentialUpdate {
            key: key.clone(),
            value: request.value,
            url: request.url,
        })
        .await
        .map_err(|e| AppError::CredentialStore(e.to_string()))?;

    if !updated {
        return Err(AppError::NotFound(format!("credential {}", key)));
    }
    Ok(Json(GenericResponse::new("updated")))
}

pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<GenericResponse>> {
    let deleted = state
        .credentials
        .delete_credential(&key)
        .await
        .map_err(|e| AppError::CredentialStore(e.to_string()))?;

    if !deleted {
        return Err(AppError::NotFound(format!("credential {}", key)));
    }
    tracing::info!("Deleted credential {}", key);
    Ok(Json(GenericResponse::new("deleted")))
}
