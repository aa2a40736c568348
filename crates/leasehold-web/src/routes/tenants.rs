//! Tenant endpoints: POST /tenants, GET|PUT|DELETE /tenants/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::AppState;
use crate::error::{AppError, Result};

/// Request payload for creating or renaming a tenant
#[derive(Debug, Deserialize)]
pub struct TenantRequest {
    #[serde(default)]
    name: Option<String>,
}

/// A tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
}

/// POST /tenants - Create a tenant
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<TenantRequest>,
) -> Result<impl IntoResponse> {
    let tenant = Tenant {
        id: Ulid::new().to_string(),
        name: validate_name(req.name)?,
    };
    state
        .tenants
        .write()
        .await
        .insert(tenant.id.clone(), tenant.clone());

    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /tenants/{id} - Fetch a tenant
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>> {
    state
        .tenants
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// PUT /tenants/{id} - Rename a tenant
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TenantRequest>,
) -> Result<Json<Tenant>> {
    let name = validate_name(req.name)?;
    let mut tenants = state.tenants.write().await;
    let tenant = tenants.get_mut(&id).ok_or_else(|| not_found(&id))?;
    tenant.name = name;

    Ok(Json(tenant.clone()))
}

/// DELETE /tenants/{id} - Remove a tenant
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .tenants
        .write()
        .await
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| not_found(&id))
}

fn validate_name(name: Option<String>) -> Result<String> {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field: name".to_string()))
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("tenant {id}"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn named(name: &str) -> Json<TenantRequest> {
        Json(TenantRequest {
            name: Some(name.to_string()),
        })
    }

    async fn seed(state: &AppState) -> String {
        let tenant = Tenant {
            id: "t-1".to_string(),
            name: "Acme".to_string(),
        };
        state
            .tenants
            .write()
            .await
            .insert(tenant.id.clone(), tenant);
        "t-1".to_string()
    }

    #[tokio::test]
    async fn test_update_renames_existing_tenant() {
        let state = AppState::new();
        let id = seed(&state).await;

        let Json(tenant) = update_tenant(State(state.clone()), Path(id.clone()), named("Globex"))
            .await
            .unwrap();
        assert_eq!(tenant.name, "Globex");

        let Json(fetched) = get_tenant(State(state), Path(id)).await.unwrap();
        assert_eq!(fetched.name, "Globex");
    }

    #[tokio::test]
    async fn test_missing_tenant_is_not_found() {
        let state = AppState::new();
        let result =
            update_tenant(State(state.clone()), Path("nope".to_string()), named("X")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = delete_tenant(State(state), Path("nope".to_string())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_tenant() {
        let state = AppState::new();
        let id = seed(&state).await;

        let status = delete_tenant(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.tenants.read().await.is_empty());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(validate_name(Some("   ".to_string())).is_err());
        assert!(validate_name(None).is_err());
        assert_eq!(validate_name(Some(" Acme ".to_string())).unwrap(), "Acme");
    }
}
