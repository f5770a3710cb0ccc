use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::info;

use catalog::{
    Document, Resource,
    models::{NewBootcamp, NewCourse, NewReview, to_document},
};

use crate::{
    database::FindQuery,
    error::AppError,
    query::{FilterPredicate, RawParams},
    results::{AdvancedResults, Envelope, Populate, populate_one},
    state::{State as AppState, bootcamp_summary},
    utils::{parse_changes, parse_payload, slugify},
};

type Shared = State<Arc<AppState>>;

const BOOTCAMP_FIELD: &str = "bootcamp";

async fn list(listing: &AdvancedResults, query: Option<String>) -> Result<Json<Envelope>, AppError> {
    let params = RawParams::from_query(query.as_deref())?;

    Ok(Json(listing.run(&params).await?))
}

async fn find_one(
    state: &AppState,
    resource: Resource,
    id: &str,
    populate: Option<&Populate>,
) -> Result<Document, AppError> {
    let document = state
        .store
        .find_by_id(resource, id)
        .await?
        .ok_or_else(|| not_found(resource, id))?;

    match populate {
        Some(relation) => Ok(populate_one(state.store.as_ref(), document, relation).await?),
        None => Ok(document),
    }
}

async fn update_one(
    state: &AppState,
    resource: Resource,
    id: &str,
    changes: Document,
) -> Result<Response, AppError> {
    let updated = state
        .store
        .update(resource, id, changes)
        .await?
        .ok_or_else(|| not_found(resource, id))?;

    Ok(single(StatusCode::OK, updated))
}

async fn insert_child(
    state: &AppState,
    resource: Resource,
    bootcamp_id: &str,
    mut document: Document,
) -> Result<Response, AppError> {
    find_one(state, Resource::Bootcamps, bootcamp_id, None).await?;

    document.insert(BOOTCAMP_FIELD.to_string(), Value::from(bootcamp_id));
    let created = state.store.insert(resource, document).await?;

    info!("Created {} under bootcamp {bootcamp_id}", resource.label());

    Ok(single(StatusCode::CREATED, created))
}

async fn children(
    state: &AppState,
    resource: Resource,
    bootcamp_id: &str,
) -> Result<Response, AppError> {
    let query = FindQuery::new(FilterPredicate::new().equals(BOOTCAMP_FIELD, bootcamp_id));
    let data = state.store.find(resource, &query).await?;

    Ok(Json(json!({
        "success": true,
        "count": data.len(),
        "data": data,
    }))
    .into_response())
}

fn single(status: StatusCode, data: Document) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

fn deleted() -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": {} }))).into_response()
}

fn not_found(resource: Resource, id: &str) -> AppError {
    AppError::NotFound {
        resource: resource.label(),
        id: id.to_string(),
    }
}

pub async fn list_bootcamps(
    State(state): Shared,
    RawQuery(query): RawQuery,
) -> Result<Json<Envelope>, AppError> {
    list(&state.bootcamps, query).await
}

pub async fn get_bootcamp(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let bootcamp = find_one(&state, Resource::Bootcamps, &id, None).await?;

    Ok(single(StatusCode::OK, bootcamp))
}

pub async fn create_bootcamp(
    State(state): Shared,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: NewBootcamp = parse_payload(&body)?;
    let mut document =
        to_document(&payload).map_err(|e| AppError::MalformedPayload(e.to_string()))?;
    document.insert("slug".to_string(), Value::from(slugify(&payload.name)));

    let created = state.store.insert(Resource::Bootcamps, document).await?;
    info!("Created bootcamp {}", payload.name);

    Ok(single(StatusCode::CREATED, created))
}

pub async fn update_bootcamp(
    State(state): Shared,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let mut changes = parse_changes(&body, &id)?;

    if let Some(name) = changes.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        changes.insert("slug".to_string(), Value::from(slug));
    }

    update_one(&state, Resource::Bootcamps, &id, changes).await
}

/// Removes a bootcamp together with its courses and reviews.
pub async fn delete_bootcamp(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .store
        .delete(Resource::Bootcamps, &id)
        .await?
        .ok_or_else(|| not_found(Resource::Bootcamps, &id))?;

    let owned = FilterPredicate::new().equals(BOOTCAMP_FIELD, id.as_str());
    let courses = state.store.delete_many(Resource::Courses, &owned).await?;
    let reviews = state.store.delete_many(Resource::Reviews, &owned).await?;

    info!("Deleted bootcamp {id} with {courses} courses and {reviews} reviews");

    Ok(deleted())
}

pub async fn list_courses(
    State(state): Shared,
    RawQuery(query): RawQuery,
) -> Result<Json<Envelope>, AppError> {
    list(&state.courses, query).await
}

pub async fn bootcamp_courses(
    State(state): Shared,
    Path(bootcamp_id): Path<String>,
) -> Result<Response, AppError> {
    children(&state, Resource::Courses, &bootcamp_id).await
}

pub async fn get_course(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let course = find_one(&state, Resource::Courses, &id, Some(&bootcamp_summary())).await?;

    Ok(single(StatusCode::OK, course))
}

pub async fn create_course(
    State(state): Shared,
    Path(bootcamp_id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: NewCourse = parse_payload(&body)?;
    let document = to_document(&payload).map_err(|e| AppError::MalformedPayload(e.to_string()))?;

    insert_child(&state, Resource::Courses, &bootcamp_id, document).await
}

pub async fn update_course(
    State(state): Shared,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let changes = parse_changes(&body, &id)?;

    update_one(&state, Resource::Courses, &id, changes).await
}

pub async fn delete_course(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .store
        .delete(Resource::Courses, &id)
        .await?
        .ok_or_else(|| not_found(Resource::Courses, &id))?;

    Ok(deleted())
}

pub async fn list_reviews(
    State(state): Shared,
    RawQuery(query): RawQuery,
) -> Result<Json<Envelope>, AppError> {
    list(&state.reviews, query).await
}

pub async fn bootcamp_reviews(
    State(state): Shared,
    Path(bootcamp_id): Path<String>,
) -> Result<Response, AppError> {
    children(&state, Resource::Reviews, &bootcamp_id).await
}

pub async fn get_review(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let review = find_one(&state, Resource::Reviews, &id, Some(&bootcamp_summary())).await?;

    Ok(single(StatusCode::OK, review))
}

pub async fn create_review(
    State(state): Shared,
    Path(bootcamp_id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: NewReview = parse_payload(&body)?;
    let document = to_document(&payload).map_err(|e| AppError::MalformedPayload(e.to_string()))?;

    insert_child(&state, Resource::Reviews, &bootcamp_id, document).await
}

pub async fn update_review(
    State(state): Shared,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let changes = parse_changes(&body, &id)?;

    update_one(&state, Resource::Reviews, &id, changes).await
}

pub async fn delete_review(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .store
        .delete(Resource::Reviews, &id)
        .await?
        .ok_or_else(|| not_found(Resource::Reviews, &id))?;

    Ok(deleted())
}
