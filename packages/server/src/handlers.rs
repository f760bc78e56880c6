//! HTTP handler functions for the shelter map API.

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use shelter_map_server_models::{
    ApiError, ApiHealth, ApiLocation, ApiShelter, PanelShelterParams, ShelterSearchParams,
};
use shelter_map_service::ServiceError;
use shelter_map_shelter_models::{NeedInput, NeedPatch, NeedTerm, ShelterInput, ShelterPatch};
use subtle::ConstantTimeEq as _;

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/public/shelters`
///
/// Searches shelters and donation points with pagination. Responds `400`
/// when a filter cannot be interpreted.
pub async fn search_shelters(
    state: web::Data<AppState>,
    params: web::Query<ShelterSearchParams>,
) -> HttpResponse {
    let (criteria, request) = match params.into_inner().into_criteria() {
        Ok(parsed) => parsed,
        Err(e) => {
            return HttpResponse::BadRequest().json(ApiError::with_details("Invalid filters", e));
        }
    };

    match state.service.search_shelters(&criteria, request).await {
        Ok(page) => {
            let now = Utc::now();
            HttpResponse::Ok().json(page.map(|summary| ApiShelter::from_summary(summary, now)))
        }
        Err(e) => service_error("search shelters", &e),
    }
}

/// `GET /api/public/shelters/{id}`
pub async fn get_shelter(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.service.get_shelter(&path).await {
        Ok(Some(detail)) => HttpResponse::Ok().json(ApiShelter::from_detail(detail, Utc::now())),
        Ok(None) => not_found("Shelter"),
        Err(e) => service_error("load shelter", &e),
    }
}

/// `GET /api/public/cities`
pub async fn cities(state: web::Data<AppState>) -> HttpResponse {
    match state.service.list_cities().await {
        Ok(cities) => HttpResponse::Ok().json(cities),
        Err(e) => service_error("list cities", &e),
    }
}

/// `GET /api/public/urgent-needs`
///
/// Returns at most 20 ranked need groups across every shelter.
pub async fn urgent_needs(state: web::Data<AppState>) -> HttpResponse {
    match state.service.urgent_needs().await {
        Ok(groups) => HttpResponse::Ok().json(groups),
        Err(e) => service_error("aggregate urgent needs", &e),
    }
}

/// `GET /api/public/need-terms`
///
/// Returns the fixed vocabulary accepted by the `needs` filter.
pub async fn need_terms() -> HttpResponse {
    HttpResponse::Ok().json(NeedTerm::all())
}

/// `GET /api/panel/shelters`
pub async fn panel_list_shelters(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<PanelShelterParams>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    let (criteria, request) = match params.into_inner().into_criteria() {
        Ok(parsed) => parsed,
        Err(e) => {
            return HttpResponse::BadRequest().json(ApiError::with_details("Invalid filters", e));
        }
    };

    match state.service.list_managed(&criteria, request).await {
        Ok(page) => {
            let now = Utc::now();
            HttpResponse::Ok().json(page.map(|location| ApiLocation::new(location, now)))
        }
        Err(e) => service_error("list shelters", &e),
    }
}

/// `POST /api/panel/shelters`
pub async fn panel_create_shelter(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ShelterInput>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.create_shelter(body.into_inner()).await {
        Ok(location) => HttpResponse::Created().json(ApiLocation::new(location, Utc::now())),
        Err(e) => service_error("create shelter", &e),
    }
}

/// `PATCH /api/panel/shelters/{id}`
pub async fn panel_update_shelter(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ShelterPatch>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.update_shelter(&path, &body).await {
        Ok(Some(location)) => HttpResponse::Ok().json(ApiLocation::new(location, Utc::now())),
        Ok(None) => not_found("Shelter"),
        Err(e) => service_error("update shelter", &e),
    }
}

/// `DELETE /api/panel/shelters/{id}`
///
/// Also deletes every need of the shelter.
pub async fn panel_delete_shelter(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.delete_shelter(&path).await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("Shelter"),
        Err(e) => service_error("delete shelter", &e),
    }
}

/// `GET /api/panel/shelters/{id}/needs`
pub async fn panel_list_needs(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.list_needs(&path).await {
        Ok(Some(needs)) => HttpResponse::Ok().json(needs),
        Ok(None) => not_found("Shelter"),
        Err(e) => service_error("list needs", &e),
    }
}

/// `POST /api/panel/shelters/{id}/needs`
pub async fn panel_create_need(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NeedInput>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.create_need(&path, body.into_inner()).await {
        Ok(Some(need)) => HttpResponse::Created().json(need),
        Ok(None) => not_found("Shelter"),
        Err(e) => service_error("create need", &e),
    }
}

/// `PATCH /api/panel/needs/{id}`
pub async fn panel_update_need(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NeedPatch>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.update_need(&path, &body).await {
        Ok(Some(need)) => HttpResponse::Ok().json(need),
        Ok(None) => not_found("Need"),
        Err(e) => service_error("update need", &e),
    }
}

/// `DELETE /api/panel/needs/{id}`
pub async fn panel_delete_need(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Some(denied) = check_token(&req, &state) {
        return denied;
    }

    match state.service.delete_need(&path).await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("Need"),
        Err(e) => service_error("delete need", &e),
    }
}

/// Returns the rejection response unless the request carries
/// `Authorization: Bearer <PANEL_TOKEN>`. The token comparison runs in
/// constant time.
fn check_token(req: &HttpRequest, state: &AppState) -> Option<HttpResponse> {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match (state.panel_token.as_deref(), presented) {
        (Some(expected), Some(token)) if tokens_match(token, expected) => None,
        _ => Some(HttpResponse::Unauthorized().json(ApiError::new("Unauthorized"))),
    }
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ApiError::new(format!("{what} not found")))
}

fn service_error(action: &str, error: &ServiceError) -> HttpResponse {
    match error {
        ServiceError::Validation(e) => {
            HttpResponse::UnprocessableEntity().json(ApiError::with_details("Invalid input", e))
        }
        ServiceError::Db(e) => {
            log::error!("Failed to {action}: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(format!("Failed to {action}")))
        }
    }
}
