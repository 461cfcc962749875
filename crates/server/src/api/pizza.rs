//! Pizza resource endpoints.
//!
//! - `GET /` - List pizzas
//! - `POST /` - Create a pizza (admin)
//! - `GET /{id}` - Fetch one pizza
//! - `PUT /{id}` - Replace a pizza (admin)
//! - `DELETE /{id}` - Delete a pizza (admin)
//!
//! Every route sits behind the bearer authentication middleware.

use crate::AppResources;
use crate::api::auth::{AdminOnly, Authenticated, require_auth};
use crate::entity::pizza;
use crate::error::ApiError;
use crate::oauth2::OAuth2State;
use crate::store::StoreError;
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    middleware,
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, EntityTrait, QueryOrder};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const PIZZA_TAG: &str = "Pizzas";

/// Creates the pizza router. Mount under `/pizzas`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_pizzas, create_pizza))
        .routes(routes!(get_pizza, update_pizza, delete_pizza))
        .layer(middleware::from_fn_with_state(state, require_auth))
}

/// Body for create and update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PizzaRequest {
    /// Unique pizza name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price in cents, must not be negative
    pub price_cents: i32,
}

impl PizzaRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("name is required"));
        }
        if self.price_cents < 0 {
            return Err(ApiError::bad_request("price_cents must not be negative"));
        }
        Ok(())
    }
}

fn map_db_error(e: sea_orm::DbErr) -> ApiError {
    match StoreError::from(e) {
        StoreError::Conflict(_) => ApiError::conflict("name_taken"),
        other => ApiError::from(other),
    }
}

async fn find_pizza(resources: &AppResources, id: i32) -> Result<pizza::Model, ApiError> {
    pizza::Entity::find_by_id(id)
        .one(resources.db.as_ref())
        .await
        .map_err(map_db_error)?
        .ok_or_else(ApiError::not_found)
}

/// List all pizzas.
#[tracing::instrument(skip(resources, _auth))]
#[utoipa::path(
    get,
    path = "",
    tag = PIZZA_TAG,
    operation_id = "List Pizzas",
    summary = "List all pizzas",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All pizzas ordered by id", body = Vec<pizza::Model>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
    )
)]
async fn list_pizzas(
    Extension(resources): Extension<AppResources>,
    Authenticated(_auth): Authenticated,
) -> Result<Json<Vec<pizza::Model>>, ApiError> {
    let pizzas = pizza::Entity::find()
        .order_by_asc(pizza::Column::Id)
        .all(resources.db.as_ref())
        .await
        .map_err(map_db_error)?;
    Ok(Json(pizzas))
}

/// Create a pizza.
#[tracing::instrument(skip(resources, auth, request), fields(user_id = auth.user_id))]
#[utoipa::path(
    post,
    path = "",
    tag = PIZZA_TAG,
    operation_id = "Create Pizza",
    summary = "Create a pizza",
    description = "**Authorization:** requires the `admin` role.",
    request_body = PizzaRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Pizza created", body = pizza::Model),
        (status = 400, description = "Invalid body", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 409, description = "Name already in use", body = ApiError),
    )
)]
async fn create_pizza(
    Extension(resources): Extension<AppResources>,
    AdminOnly(auth): AdminOnly,
    Json(request): Json<PizzaRequest>,
) -> Result<(StatusCode, Json<pizza::Model>), ApiError> {
    request.validate()?;

    let now = OffsetDateTime::now_utc();
    let created = pizza::ActiveModel {
        id: NotSet,
        name: Set(request.name.trim().to_string()),
        description: Set(request.description),
        price_cents: Set(request.price_cents),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .map_err(map_db_error)?;

    tracing::info!(pizza_id = created.id, "Pizza created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetch one pizza.
#[tracing::instrument(skip(resources, _auth))]
#[utoipa::path(
    get,
    path = "/{id}",
    tag = PIZZA_TAG,
    operation_id = "Get Pizza",
    summary = "Fetch a pizza by id",
    params(("id" = i32, Path, description = "Pizza id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The pizza", body = pizza::Model),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 404, description = "No such pizza", body = ApiError),
    )
)]
async fn get_pizza(
    Extension(resources): Extension<AppResources>,
    Authenticated(_auth): Authenticated,
    Path(id): Path<i32>,
) -> Result<Json<pizza::Model>, ApiError> {
    Ok(Json(find_pizza(&resources, id).await?))
}

/// Replace a pizza's fields.
#[tracing::instrument(skip(resources, auth, request), fields(user_id = auth.user_id))]
#[utoipa::path(
    put,
    path = "/{id}",
    tag = PIZZA_TAG,
    operation_id = "Update Pizza",
    summary = "Update a pizza",
    description = "**Authorization:** requires the `admin` role.",
    params(("id" = i32, Path, description = "Pizza id")),
    request_body = PizzaRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated pizza", body = pizza::Model),
        (status = 400, description = "Invalid body", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "No such pizza", body = ApiError),
        (status = 409, description = "Name already in use", body = ApiError),
    )
)]
async fn update_pizza(
    Extension(resources): Extension<AppResources>,
    AdminOnly(auth): AdminOnly,
    Path(id): Path<i32>,
    Json(request): Json<PizzaRequest>,
) -> Result<Json<pizza::Model>, ApiError> {
    request.validate()?;

    let mut active: pizza::ActiveModel = find_pizza(&resources, id).await?.into();
    active.name = Set(request.name.trim().to_string());
    active.description = Set(request.description);
    active.price_cents = Set(request.price_cents);
    active.updated_at = Set(OffsetDateTime::now_utc());
    let updated = active
        .update(resources.db.as_ref())
        .await
        .map_err(map_db_error)?;

    Ok(Json(updated))
}

/// Delete a pizza.
#[tracing::instrument(skip(resources, auth), fields(user_id = auth.user_id))]
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = PIZZA_TAG,
    operation_id = "Delete Pizza",
    summary = "Delete a pizza",
    description = "**Authorization:** requires the `admin` role.",
    params(("id" = i32, Path, description = "Pizza id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Pizza deleted"),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "No such pizza", body = ApiError),
    )
)]
async fn delete_pizza(
    Extension(resources): Extension<AppResources>,
    AdminOnly(auth): AdminOnly,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let result = pizza::Entity::delete_by_id(id)
        .exec(resources.db.as_ref())
        .await
        .map_err(map_db_error)?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found());
    }

    tracing::info!(pizza_id = id, "Pizza deleted");
    Ok(StatusCode::NO_CONTENT)
}
