//! In-process fake of the WASP REST API, backed by in-memory collections.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use wasp_client::WaspClient;

type Object = Map<String, Value>;
type Shared = Arc<Mutex<FakeState>>;

const SYSTEM_TAGS: [&str; 5] = ["date", "_id", "conduitVersion", "unique_name", "version"];

#[derive(Debug, Default)]
pub struct FakeState {
    /// Every stored version, per collection, in insertion order.
    pub collections: HashMap<String, Vec<Object>>,
    /// File id to (file name, content).
    pub files: HashMap<String, (String, Vec<u8>)>,
    pub system_info: HashMap<String, Value>,
    pub views: HashMap<(String, String), Value>,
    /// Answer JSON multipart uploads with 404, like servers that only take form fields.
    pub legacy_uploads: bool,
    /// Answer history requests newest version first.
    pub history_newest_first: bool,
    /// `METHOD /path` of every request received.
    pub requests: Vec<String>,
    /// `Authorization` header of every request that carried one.
    pub authorizations: Vec<String>,
    /// Part names of every multipart upload, in request order.
    pub upload_parts: Vec<Vec<String>>,
    next_id: u64,
}

impl FakeState {
    pub fn with_history_newest_first(mut self) -> Self {
        self.history_newest_first = true;
        self
    }

    pub fn with_legacy_uploads(mut self) -> Self {
        self.legacy_uploads = true;
        self
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn key_tags(&self, collection: &str) -> Vec<String> {
        self.system_info
            .get(collection)
            .and_then(Value::as_object)
            .map(|tags| {
                tags.iter()
                    .filter(|(_, schema)| schema["isKey"] == json!(true))
                    .map(|(tag, _)| tag.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn latest_mut(&mut self, collection: &str, id: &str) -> Option<&mut Object> {
        self.collections
            .get_mut(collection)?
            .iter_mut()
            .rev()
            .find(|record| record["_id"] == json!(id))
    }

    fn count(&self, request: &str) -> usize {
        self.requests.iter().filter(|r| r.as_str() == request).count()
    }
}

pub struct FakeWasp {
    pub url: String,
    state: Shared,
}

impl FakeWasp {
    pub async fn start() -> Self {
        Self::start_with(FakeState::default()).await
    }

    pub async fn start_with(state: FakeState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake server");
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self { url, state }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn client(&self) -> WaspClient {
        WaspClient::new(&self.url).unwrap()
    }

    /// How many times `METHOD /path` was requested.
    pub fn count(&self, request: &str) -> usize {
        self.state().count(request)
    }
}

/// A server that answers every request with `status`.
pub async fn start_failing(status: StatusCode) -> String {
    let app = Router::new().fallback(move || async move { (status, "unavailable") });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    url
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/tools/{collection}/records", get(find_all).post(add_record))
        .route("/tools/{collection}/records/latest", get(find_latest))
        .route("/tools/{collection}/records/{id}", get(get_record))
        .route("/tools/{collection}/records/{id}/history", get(history))
        .route("/tools/{collection}/records/{id}/{op}", put(record_op))
        .route("/tools/{collection}/tags/{tag}/values", get(tag_values))
        .route("/utils/safeDeleteRecords", post(delete_records))
        .route("/system/tools/{collection}/tags_object", get(tags_object))
        .route("/system/view_config/{collection}/{view}", get(view_config))
        .route("/file/{id}", get(file))
        .route("/actions/services/{action}", post(action))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), log_request))
        .with_state(state)
}

async fn log_request(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let line = format!("{} {}", request.method(), request.uri().path());
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    {
        let mut state = state.lock().unwrap();
        state.requests.push(line);
        state.authorizations.extend(authorization);
    }
    next.run(request).await
}

// -- Search ---------------------------------------------------------------

async fn find_all(
    State(state): State<Shared>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Object>> {
    let state = state.lock().unwrap();
    let versions = state.collections.get(&collection).cloned().unwrap_or_default();
    Json(versions.into_iter().filter(|r| matches(r, &query)).collect())
}

async fn find_latest(
    State(state): State<Shared>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Object>> {
    let state = state.lock().unwrap();
    let versions = state.collections.get(&collection).cloned().unwrap_or_default();
    let mut newest: HashMap<String, i64> = HashMap::new();
    for record in &versions {
        let version = record["version"].as_i64().unwrap_or(0);
        let entry = newest.entry(record["_id"].to_string()).or_insert(version);
        *entry = (*entry).max(version);
    }
    Json(
        versions
            .into_iter()
            .filter(|r| newest[&r["_id"].to_string()] == r["version"].as_i64().unwrap_or(0))
            .filter(|r| matches(r, &query))
            .collect(),
    )
}

async fn get_record(
    State(state): State<Shared>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    match state.latest_mut(&collection, &id) {
        Some(record) => Json(record.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no such record").into_response(),
    }
}

async fn history(
    State(state): State<Shared>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let state = state.lock().unwrap();
    let mut versions: Vec<Object> = state
        .collections
        .get(&collection)
        .into_iter()
        .flatten()
        .filter(|r| r["_id"] == json!(id))
        .cloned()
        .collect();
    if versions.is_empty() {
        return (StatusCode::NOT_FOUND, "no such record").into_response();
    }
    if state.history_newest_first {
        versions.reverse();
    }
    Json(versions).into_response()
}

async fn tag_values(
    State(state): State<Shared>,
    Path((collection, tag)): Path<(String, String)>,
) -> Json<Vec<Value>> {
    let state = state.lock().unwrap();
    Json(
        state
            .collections
            .get(&collection)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get(&tag).cloned())
            .collect(),
    )
}

fn matches(record: &Object, query: &HashMap<String, String>) -> bool {
    query.iter().all(|(key, expected)| {
        let mut path = key.split('.');
        let first = path.next().and_then(|tag| record.get(tag));
        let value = path.fold(first, |current, tag| current.and_then(|v| v.get(tag)));
        value.and_then(plain).as_deref() == Some(expected.as_str())
    })
}

fn plain(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        Value::Array(items) => Some(items.iter().filter_map(plain).collect::<Vec<_>>().join(",")),
        _ => None,
    }
}

// -- Uploads --------------------------------------------------------------

#[derive(Default)]
struct Upload {
    /// Names of all parts, in order.
    parts: Vec<String>,
    /// Which part carried the JSON body: `conduit_json` or `conduit_update`.
    body_part: Option<String>,
    json: Option<Value>,
    remove: Vec<String>,
    fields: Vec<(String, String)>,
    files: Vec<(String, String, Vec<u8>)>,
}

async fn read_upload(mut multipart: Multipart) -> Upload {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap();
        upload.parts.push(name.clone());
        match (name.as_str(), file_name) {
            ("conduit_json" | "conduit_update", _) => {
                upload.json = Some(serde_json::from_slice(&data).unwrap());
                upload.body_part = Some(name);
            }
            ("conduit_remove", _) => upload.remove = serde_json::from_slice(&data).unwrap(),
            (_, Some(file_name)) => upload.files.push((name, file_name, data.to_vec())),
            (_, None) => upload
                .fields
                .push((name, String::from_utf8(data.to_vec()).unwrap())),
        }
    }
    upload
}

/// Store uploaded files and build the record body they belong to.
fn upload_body(state: &mut FakeState, upload: Upload) -> Object {
    let mut stored = HashMap::new();
    for (part, file_name, data) in upload.files {
        let id = state.new_id("f");
        state.files.insert(id.clone(), (file_name.clone(), data));
        stored.insert(
            part,
            json!({"type": "mongo_file", "mongo_id": id, "name": file_name}),
        );
    }

    match upload.json {
        Some(mut json) => {
            replace_placeholders(&mut json, &stored);
            json.as_object().cloned().unwrap_or_default()
        }
        None => {
            let mut object = Object::new();
            for (key, value) in upload.fields {
                insert_form(&mut object, &key, Value::String(value));
            }
            for (key, entry) in stored {
                insert_form(&mut object, &key, entry);
            }
            object
        }
    }
}

fn replace_placeholders(value: &mut Value, stored: &HashMap<String, Value>) {
    match value {
        Value::Object(object) if object.get("type") == Some(&json!("conduit_file")) => {
            let part = object["name"].as_str().unwrap_or_default();
            *value = stored.get(part).cloned().unwrap_or(Value::Null);
        }
        Value::Object(object) => object
            .values_mut()
            .for_each(|v| replace_placeholders(v, stored)),
        Value::Array(items) => items.iter_mut().for_each(|v| replace_placeholders(v, stored)),
        _ => {}
    }
}

/// Insert a form value under an `a[b][c]` key; repeated keys become lists.
fn insert_form(object: &mut Object, key: &str, value: Value) {
    let path: Vec<&str> = key.split(['[', ']']).filter(|s| !s.is_empty()).collect();
    insert_path(object, &path, value);
}

fn insert_path(object: &mut Object, path: &[&str], value: Value) {
    let [head, rest @ ..] = path else { return };
    if rest.is_empty() {
        let merged = match object.remove(*head) {
            None => value,
            Some(Value::Array(mut items)) => {
                items.push(value);
                Value::Array(items)
            }
            Some(previous) => json!([previous, value]),
        };
        object.insert((*head).to_string(), merged);
    } else if let Value::Object(nested) = object
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Object::new()))
    {
        insert_path(nested, rest, value);
    }
}

fn store(state: &mut FakeState, collection: &str, mut body: Object) -> Object {
    for tag in SYSTEM_TAGS {
        body.remove(tag);
    }
    let keys = state.key_tags(collection);
    let previous = state
        .collections
        .get(collection)
        .into_iter()
        .flatten()
        .rev()
        .find(|r| !keys.is_empty() && keys.iter().all(|k| r.get(k) == body.get(k)))
        .map(|r| (r["_id"].clone(), r["version"].as_i64().unwrap_or(0)));

    let (id, version) = match previous {
        Some((id, version)) => (id, version + 1),
        None => (json!(state.new_id("r")), 1),
    };
    body.insert("unique_name".into(), json!(format!("{collection}{}", id.as_str().unwrap_or_default())));
    body.insert("_id".into(), id);
    body.insert("version".into(), json!(version));
    body.insert("date".into(), json!("2024-01-01T00:00:00"));

    state
        .collections
        .entry(collection.to_string())
        .or_default()
        .push(body.clone());
    body
}

async fn add_record(
    State(state): State<Shared>,
    Path(collection): Path<String>,
    multipart: Multipart,
) -> Response {
    let upload = read_upload(multipart).await;
    let mut state = state.lock().unwrap();
    state.upload_parts.push(upload.parts.clone());
    if upload.body_part.as_deref() == Some("conduit_update") {
        return (StatusCode::BAD_REQUEST, "conduit_update is for in-place updates").into_response();
    }
    if state.legacy_uploads && upload.json.is_some() {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    let body = upload_body(&mut state, upload);
    let stored = store(&mut state, &collection, body);
    (StatusCode::CREATED, Json(stored)).into_response()
}

async fn record_op(
    State(state): State<Shared>,
    Path((collection, id, op)): Path<(String, String, String)>,
    multipart: Multipart,
) -> Response {
    let upload = read_upload(multipart).await;
    let mut state = state.lock().unwrap();
    state.upload_parts.push(upload.parts.clone());
    let in_place = matches!(op.as_str(), "update" | "set_immutable" | "set_mutable");
    if in_place != (upload.body_part.as_deref() == Some("conduit_update")) {
        return (StatusCode::BAD_REQUEST, format!("unexpected body part for {op}")).into_response();
    }
    if op == "meta" && state.legacy_uploads && upload.json.is_some() {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    let remove = upload.remove.clone();
    let body = upload_body(&mut state, upload);
    let Some(record) = state.latest_mut(&collection, &id) else {
        return (StatusCode::NOT_FOUND, "no such record").into_response();
    };
    let mutable = record.get("conduit_mutable") != Some(&json!(false));

    match op.as_str() {
        "update" if !mutable => return (StatusCode::CONFLICT, "record is immutable").into_response(),
        "update" => {
            for (tag, value) in body {
                record.insert(tag, value);
            }
            for tag in remove {
                record.remove(&tag);
            }
        }
        "meta" => {
            for (tag, value) in body {
                let is_meta = record
                    .get(&tag)
                    .is_some_and(|current| current["type"] == json!("meta_data"));
                if !is_meta {
                    return (StatusCode::BAD_REQUEST, format!("{tag} is not metadata"))
                        .into_response();
                }
                record.insert(tag, value);
            }
        }
        "set_immutable" => {
            record.insert("conduit_mutable".into(), json!(false));
        }
        "set_mutable" => {
            record.insert("conduit_mutable".into(), json!(true));
        }
        _ => return StatusCode::NOT_FOUND.into_response(),
    }
    Json(record.clone()).into_response()
}

async fn delete_records(State(state): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    let collection = body["tool"].as_str().unwrap_or_default().to_string();
    let unique_name = body["query"]["unique_name"].clone();
    let mut state = state.lock().unwrap();
    let Some(versions) = state.collections.get_mut(&collection) else {
        return StatusCode::NOT_FOUND;
    };
    let before = versions.len();
    versions.retain(|r| r["unique_name"] != unique_name);
    if versions.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}

// -- Schema, files, actions ---------------------------------------------

async fn tags_object(State(state): State<Shared>, Path(collection): Path<String>) -> Response {
    match state.lock().unwrap().system_info.get(&collection) {
        Some(info) => Json(info.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn view_config(
    State(state): State<Shared>,
    Path((collection, view)): Path<(String, String)>,
) -> Response {
    match state.lock().unwrap().views.get(&(collection, view)) {
        Some(config) => Json(config.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn file(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match state.lock().unwrap().files.get(&id) {
        Some((name, data)) => (
            [(header::CONTENT_DISPOSITION, format!("attachment; filename={name}"))],
            data.clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

async fn action(Path(action): Path<String>, multipart: Multipart) -> Response {
    let upload = read_upload(multipart).await;
    if action == "fail" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "exit status 1").into_response();
    }
    let params: Object = upload
        .fields
        .into_iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    Json(json!({"action": action, "params": params})).into_response()
}
