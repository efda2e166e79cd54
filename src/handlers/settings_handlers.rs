use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::{error::ApiError, AppState};

const VISIBLE_SUFFIX: usize = 4;

#[derive(Debug, Serialize, PartialEq)]
pub struct SecretField {
    pub is_set: bool,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct SecretsView {
    pub secrets: BTreeMap<String, SecretField>,
}

/// List stored provider credentials. Values are never returned in full.
pub async fn get_secrets(State(app_state): State<AppState>) -> Result<Json<SecretsView>, ApiError> {
    Ok(Json(to_view(&app_state.secrets.snapshot())))
}

/// Merge credential changes into the secret store. An empty value removes the key.
pub async fn update_secrets(
    State(app_state): State<AppState>,
    Json(changes): Json<HashMap<String, String>>,
) -> Result<Json<SecretsView>, ApiError> {
    let keys: Vec<&String> = changes.keys().collect();
    tracing::info!(keys = ?keys, "updating secret store");
    let updated = app_state.secrets.update(changes).await?;
    Ok(Json(to_view(&updated)))
}

fn to_view(values: &HashMap<String, String>) -> SecretsView {
    let secrets = values
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                SecretField {
                    is_set: !value.trim().is_empty(),
                    value: mask(value),
                },
            )
        })
        .collect();
    SecretsView { secrets }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() <= VISIBLE_SUFFIX * 2 {
        return "*".repeat(chars.len().min(8));
    }
    let suffix: String = chars[chars.len() - VISIBLE_SUFFIX..].iter().collect();
    format!("****{}", suffix)
}
