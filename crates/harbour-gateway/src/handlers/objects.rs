//! Object operation handlers
//!
//! | Verb     | Accept        | Outcome                                         |
//! |----------|---------------|-------------------------------------------------|
//! | POST     | metadata      | 201/200 descriptor with upload links, 403, 404  |
//! | GET/HEAD | content       | 302 to a signed download URL, 404               |
//! | GET/HEAD | metadata      | 200 descriptor with a download link, 404        |
//! | OPTIONS  | content       | 200, 204, 403, 404                              |
//! | PUT      | any           | 405                                             |
//!
//! Each handler asks the metadata store first and only then issues links.

use crate::types::{
    ObjectDescriptor, RegisterBody, Representation, META_MEDIA_TYPE, REL_CALLBACK, REL_DOWNLOAD,
    REL_UPLOAD,
};
use crate::{ApiError, AppState};
use axum::{
    extract::{rejection::BytesRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use harbour_meta::{ObjectKey, ObjectMeta};
use harbour_signer::{is_valid_oid, Link};
use std::sync::Arc;
use tracing::debug;

/// POST /{user}/{repo}/objects - Register an object and hand out upload links
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((user, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    if Representation::from_headers(&headers) != Some(Representation::Meta) {
        return Err(ApiError::NoRoute);
    }

    // Oversized or unreadable bodies are malformed, not a separate status
    let body = body.map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    let request: RegisterBody =
        serde_json::from_slice(&body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;
    if !is_valid_oid(&request.oid) {
        return Err(ApiError::MalformedBody(format!("invalid oid {:?}", request.oid)));
    }
    let key = object_key(user, repo, request.oid)?;

    let meta = state
        .meta
        .register(&key, request.size, authorization(&headers))
        .await
        .found()
        .ok_or(ApiError::NotFound)?;

    if !meta.writeable {
        debug!(key = %key, "registration denied write access");
        return Err(ApiError::Forbidden);
    }

    let descriptor = ObjectDescriptor::new(&meta.oid, meta.size)
        .with_link(REL_DOWNLOAD, state.issuer.download_link(&meta.oid)?)
        .with_link(REL_UPLOAD, state.issuer.upload_link(&meta.oid)?)
        .with_link(REL_CALLBACK, Link::new(&state.config.callback_url));

    let status = if meta.existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok(descriptor_response(status, descriptor))
}

/// GET|HEAD /{user}/{repo}/objects/{oid} - Redirect to bytes or describe the object
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((user, repo, oid)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let representation = Representation::from_headers(&headers).ok_or(ApiError::NoRoute)?;
    let key = object_key(user, repo, oid)?;
    let meta = fetch(&state, &key, &headers).await?;
    let download = state.issuer.download_link(&meta.oid)?;

    match representation {
        Representation::Content => {
            Ok((StatusCode::FOUND, [(header::LOCATION, download.href)]).into_response())
        }
        Representation::Meta => {
            let descriptor =
                ObjectDescriptor::new(meta.oid, meta.size).with_link(REL_DOWNLOAD, download);
            Ok(descriptor_response(StatusCode::OK, descriptor))
        }
    }
}

/// OPTIONS /{user}/{repo}/objects/{oid} - Probe whether the caller may upload
pub async fn options_object(
    State(state): State<Arc<AppState>>,
    Path((user, repo, oid)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    if Representation::from_headers(&headers) != Some(Representation::Content) {
        return Err(ApiError::NoRoute);
    }

    let key = object_key(user, repo, oid)?;
    let meta = fetch(&state, &key, &headers).await?;

    if !meta.writeable {
        return Err(ApiError::Forbidden);
    }

    if meta.oid.is_empty() {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::OK)
    }
}

/// PUT /{user}/{repo}/objects/{oid} - Always refused; bytes go to the signed upload link
pub async fn put_object() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn fetch(state: &AppState, key: &ObjectKey, headers: &HeaderMap) -> Result<ObjectMeta, ApiError> {
    state
        .meta
        .fetch(key, authorization(headers))
        .await
        .found()
        .ok_or(ApiError::NotFound)
}

fn object_key(user: String, repo: String, oid: String) -> Result<ObjectKey, ApiError> {
    if !is_valid_oid(&oid) {
        return Err(ApiError::InvalidOid(oid));
    }

    ObjectKey::new(user, repo, oid).map_err(|e| ApiError::InvalidOid(e.to_string()))
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

fn descriptor_response(status: StatusCode, descriptor: ObjectDescriptor) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, META_MEDIA_TYPE)],
        Json(descriptor),
    )
        .into_response()
}
