use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::gemini::GeminiClient;
use larder_core::models::{
    GenerateRecipeRequest, NewPantryItem, NewShoppingItem, PantryFilter, UpdatePantryItem,
    UpdateShoppingItem, parse_iso_date, validate_meal_type,
};
use larder_core::service::LarderService;

const BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<LarderService>>,
    gemini: Option<Arc<GeminiClient>>,
    api_key: Option<String>,
    user_id: i64,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreatePantryRequest {
    name: String,
    quantity: f64,
    unit: String,
    category: String,
    expiry_date: Option<String>,
    #[serde(default)]
    is_running_low: bool,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdatePantryRequest {
    name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    expiry_date: Option<Option<String>>,
    is_running_low: Option<bool>,
}

#[derive(Deserialize)]
struct PantryQuery {
    category: Option<String>,
    running_low: Option<bool>,
}

#[derive(Deserialize)]
struct ExpiringQuery {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct CreateSlotRequest {
    recipe_id: i64,
    meal_date: String,
    meal_type: String,
}

#[derive(Deserialize)]
struct PlanRangeQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct UpcomingQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct CreateShoppingRequest {
    ingredient_name: String,
    quantity: f64,
    unit: String,
    category: Option<String>,
}

#[derive(Deserialize)]
struct UpdateShoppingRequest {
    ingredient_name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    category: Option<String>,
    is_checked: Option<bool>,
}

#[derive(Deserialize)]
struct GenerateListRequest {
    #[serde(alias = "startDate")]
    start_date: String,
    #[serde(alias = "endDate")]
    end_date: Option<String>,
}

#[derive(Deserialize)]
struct SuggestRequest {
    ingredients: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                eprintln!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn lock_service(state: &AppState) -> std::sync::MutexGuard<'_, LarderService> {
    state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe handlers ---

async fn generate_recipe(
    State(state): State<AppState>,
    Json(req): Json<GenerateRecipeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let gemini = state.gemini.clone().ok_or_else(|| {
        ApiError::BadRequest("AI generation is not configured (set GEMINI_API_KEY)".to_string())
    })?;

    let recipe = gemini
        .generate_async(&req)
        .await
        .context("recipe generation failed")?;

    let detail = {
        let svc = lock_service(&state);
        svc.add_recipe(state.user_id, &recipe)
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?
    };

    let value = serde_json::to_value(detail).context("failed to serialize recipe")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn suggest_ingredients(
    State(state): State<AppState>,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    let gemini = state.gemini.clone().ok_or_else(|| {
        ApiError::BadRequest("AI generation is not configured (set GEMINI_API_KEY)".to_string())
    })?;

    let suggestions = gemini
        .suggest_ingredients_async(&req.ingredients)
        .await
        .context("ingredient suggestion failed")?;
    Ok(Json(suggestions))
}

async fn list_recipes(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let recipes = lock_service(&state).list_recipes(state.user_id)?;
    let value = serde_json::to_value(recipes).context("failed to serialize recipes")?;
    Ok(Json(value))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let detail = lock_service(&state)
        .recipe_detail(id, state.user_id)
        .map_err(|_| ApiError::NotFound(format!("Recipe {id} not found")))?;
    let value = serde_json::to_value(detail).context("failed to serialize recipe")?;
    Ok(Json(value))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if lock_service(&state).delete_recipe(id, state.user_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Recipe {id} not found")))
    }
}

// --- Pantry handlers ---

async fn list_pantry(
    State(state): State<AppState>,
    Query(params): Query<PantryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = PantryFilter {
        category: params.category,
        is_running_low: params.running_low,
    };
    let items = lock_service(&state).list_pantry(state.user_id, &filter)?;
    let value = serde_json::to_value(items).context("failed to serialize pantry")?;
    Ok(Json(value))
}

async fn create_pantry_item(
    State(state): State<AppState>,
    Json(req): Json<CreatePantryRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let expiry_date = req
        .expiry_date
        .as_deref()
        .map(parse_iso_date)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let item = lock_service(&state)
        .add_pantry_item(
            state.user_id,
            &NewPantryItem {
                name: req.name,
                quantity: req.quantity,
                unit: req.unit,
                category: req.category,
                expiry_date,
                is_running_low: req.is_running_low,
            },
        )
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let value = serde_json::to_value(item).context("failed to serialize pantry item")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn update_pantry_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePantryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let expiry_date = match req.expiry_date {
        None => None,
        Some(None) => Some(None),
        Some(Some(s)) => Some(Some(
            parse_iso_date(&s).map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        )),
    };

    let update = UpdatePantryItem {
        name: req.name,
        quantity: req.quantity,
        unit: req.unit,
        category: req.category,
        expiry_date,
        is_running_low: req.is_running_low,
    };

    let item = lock_service(&state)
        .update_pantry_item(id, state.user_id, &update)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?
        .ok_or_else(|| ApiError::NotFound(format!("Pantry item {id} not found")))?;

    let value = serde_json::to_value(item).context("failed to serialize pantry item")?;
    Ok(Json(value))
}

async fn delete_pantry_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if lock_service(&state).remove_pantry_item(id, state.user_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Pantry item {id} not found")))
    }
}

async fn expiring_pantry(
    State(state): State<AppState>,
    Query(params): Query<ExpiringQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let days = params.days.unwrap_or(7);
    if days < 0 {
        return Err(ApiError::BadRequest("days must be non-negative".to_string()));
    }
    let today = chrono::Local::now().date_naive();
    let items = lock_service(&state).expiring_soon(state.user_id, today, days)?;
    let value = serde_json::to_value(items).context("failed to serialize pantry")?;
    Ok(Json(value))
}

// --- Meal plan handlers ---

async fn upsert_meal_slot(
    State(state): State<AppState>,
    Json(req): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    validate_meal_type(&req.meal_type).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    parse_iso_date(&req.meal_date).map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let slot = lock_service(&state)
        .plan_meal(state.user_id, &req.meal_date, &req.meal_type, req.recipe_id)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let value = serde_json::to_value(slot).context("failed to serialize slot")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn get_meal_plan(
    State(state): State<AppState>,
    Query(params): Query<PlanRangeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let start = params
        .start
        .unwrap_or_else(|| chrono::Local::now().date_naive().format("%Y-%m-%d").to_string());

    let svc = lock_service(&state);
    let meals = match params.end {
        Some(end) => svc
            .plan_range(state.user_id, &start, &end)
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        None => svc
            .weekly_plan(state.user_id, &start)
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
    };

    let value = serde_json::to_value(meals).context("failed to serialize meal plan")?;
    Ok(Json(value))
}

async fn get_upcoming_meals(
    State(state): State<AppState>,
    Query(params): Query<UpcomingQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let meals = lock_service(&state).upcoming_meals(state.user_id, today, params.limit.unwrap_or(5))?;
    let value = serde_json::to_value(meals).context("failed to serialize meals")?;
    Ok(Json(value))
}

async fn get_meal_plan_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let stats = lock_service(&state).meal_plan_stats(state.user_id, today)?;
    let value = serde_json::to_value(stats).context("failed to serialize stats")?;
    Ok(Json(value))
}

async fn delete_meal_slot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let slot = lock_service(&state)
        .unplan_meal(id, state.user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Meal slot {id} not found")))?;
    let value = serde_json::to_value(slot).context("failed to serialize slot")?;
    Ok(Json(value))
}

// --- Shopping list handlers ---

async fn list_shopping(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = lock_service(&state).shopping_list(state.user_id)?;
    let value = serde_json::to_value(items).context("failed to serialize shopping list")?;
    Ok(Json(value))
}

async fn grouped_shopping(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = lock_service(&state).shopping_list_by_category(state.user_id)?;
    let value = serde_json::to_value(groups).context("failed to serialize shopping list")?;
    Ok(Json(value))
}

async fn create_shopping_item(
    State(state): State<AppState>,
    Json(req): Json<CreateShoppingRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let item = lock_service(&state)
        .add_shopping_item(
            state.user_id,
            &NewShoppingItem {
                ingredient_name: req.ingredient_name,
                quantity: req.quantity,
                unit: req.unit,
                category: req.category,
            },
        )
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let value = serde_json::to_value(item).context("failed to serialize shopping item")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn update_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateShoppingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let update = UpdateShoppingItem {
        ingredient_name: req.ingredient_name,
        quantity: req.quantity,
        unit: req.unit,
        category: req.category,
        is_checked: req.is_checked,
    };

    let item = lock_service(&state)
        .update_shopping_item(id, state.user_id, &update)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?
        .ok_or_else(|| ApiError::NotFound(format!("Shopping item {id} not found")))?;

    let value = serde_json::to_value(item).context("failed to serialize shopping item")?;
    Ok(Json(value))
}

async fn toggle_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = lock_service(&state)
        .toggle_shopping_item(id, state.user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Shopping item {id} not found")))?;
    let value = serde_json::to_value(item).context("failed to serialize shopping item")?;
    Ok(Json(value))
}

async fn delete_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = lock_service(&state)
        .remove_shopping_item(id, state.user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Shopping item {id} not found")))?;
    let value = serde_json::to_value(item).context("failed to serialize shopping item")?;
    Ok(Json(value))
}

async fn clear_checked_items(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = lock_service(&state).clear_checked(state.user_id)?;
    let value = serde_json::to_value(removed).context("failed to serialize shopping items")?;
    Ok(Json(value))
}

async fn clear_all_items(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = lock_service(&state).clear_all(state.user_id)?;
    let value = serde_json::to_value(removed).context("failed to serialize shopping items")?;
    Ok(Json(value))
}

async fn checked_to_pantry(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let moved = lock_service(&state).move_checked_to_pantry(state.user_id)?;
    let value = serde_json::to_value(moved).context("failed to serialize shopping items")?;
    Ok(Json(value))
}

async fn generate_shopping_list(
    State(state): State<AppState>,
    Json(req): Json<GenerateListRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = lock_service(&state);
    let list = match req.end_date {
        Some(end) => svc
            .generate_shopping_list(state.user_id, &req.start_date, &end)
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        None => svc
            .generate_shopping_list_for_week(state.user_id, &req.start_date)
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
    };
    let value = serde_json::to_value(list).context("failed to serialize shopping list")?;
    Ok(Json(value))
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", post(generate_recipe).get(list_recipes))
        .route("/api/recipes/suggest-ingredients", post(suggest_ingredients))
        .route("/api/recipes/{id}", get(get_recipe).delete(delete_recipe))
        .route("/api/pantry", get(list_pantry).post(create_pantry_item))
        .route("/api/pantry/expiring", get(expiring_pantry))
        .route(
            "/api/pantry/{id}",
            axum::routing::put(update_pantry_item).delete(delete_pantry_item),
        )
        .route("/api/meal-plans", post(upsert_meal_slot).get(get_meal_plan))
        .route("/api/meal-plans/upcoming", get(get_upcoming_meals))
        .route("/api/meal-plans/stats", get(get_meal_plan_stats))
        .route("/api/meal-plans/{id}", delete(delete_meal_slot))
        .route(
            "/api/shopping-list",
            get(list_shopping)
                .post(create_shopping_item)
                .delete(clear_all_items),
        )
        .route("/api/shopping-list/grouped", get(grouped_shopping))
        .route("/api/shopping-list/generate", post(generate_shopping_list))
        .route("/api/shopping-list/checked", delete(clear_checked_items))
        .route("/api/shopping-list/to-pantry", post(checked_to_pantry))
        .route(
            "/api/shopping-list/{id}",
            axum::routing::put(update_shopping_item).delete(delete_shopping_item),
        )
        .route("/api/shopping-list/{id}/toggle", patch(toggle_shopping_item))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: LarderService,
    user_id: i64,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let gemini = crate::config::Config::gemini_api_key().map(|key| Arc::new(GeminiClient::new(key)));
    if gemini.is_none() {
        eprintln!("Note: GEMINI_API_KEY not set. AI recipe routes will return an error.");
    }

    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        gemini,
        api_key: api_key.clone(),
        user_id,
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
