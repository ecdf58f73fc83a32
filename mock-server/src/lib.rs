use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const TOKEN: &str = "token123456";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    #[serde(rename = "type")]
    pub kind: String,
    pub page: Option<usize>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NewPost {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerTime {
    pub millis: u64,
}

/// What the server saw of an `/echo` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

/// One part of an `/upload` request as the server parsed it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Upload {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Delay {
    pub ms: u64,
}

pub type Db = Arc<RwLock<BTreeMap<String, Post>>>;

fn seed() -> BTreeMap<String, Post> {
    [
        ("welcome", "article", "Welcome"),
        ("notes", "article", "Release notes"),
        ("launch", "news", "Launch day"),
    ]
    .into_iter()
    .map(|(key, kind, title)| {
        let post = Post {
            key: key.to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
        };
        (post.key.clone(), post)
    })
    .collect()
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(seed()));
    Router::new()
        .route("/lemon/getServerTime", get(server_time))
        .route("/lemon/post/query", post(query_posts))
        .route("/lemon/post/body", post(create_post))
        .route("/lemon/post/{key}", get(get_post).delete(delete_post))
        .route("/lemon/echo", get(echo))
        .route("/lemon/slow", get(slow))
        .route("/lemon/upload", post(upload))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn server_time(headers: HeaderMap) -> Result<Json<ServerTime>, StatusCode> {
    if headers.get("x-token").and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_millis() as u64;
    Ok(Json(ServerTime { millis }))
}

async fn query_posts(State(db): State<Db>, Form(query): Form<PostQuery>) -> Json<Vec<Post>> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10);
    let posts = db.read().await;
    Json(
        posts
            .values()
            .filter(|p| p.kind == query.kind)
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect(),
    )
}

async fn create_post(
    State(db): State<Db>,
    Json(input): Json<NewPost>,
) -> (StatusCode, Json<Post>) {
    let post = Post {
        key: Uuid::new_v4().to_string(),
        kind: input.kind,
        title: input.title,
    };
    info!(key = %post.key, "created post");
    db.write().await.insert(post.key.clone(), post.clone());
    (StatusCode::CREATED, Json(post))
}

async fn get_post(
    State(db): State<Db>,
    Path(key): Path<String>,
) -> Result<Json<Post>, (StatusCode, String)> {
    let posts = db.read().await;
    posts
        .get(&key)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("no post `{key}`")))
}

async fn delete_post(State(db): State<Db>, Path(key): Path<String>) -> StatusCode {
    match db.write().await.remove(&key) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn echo(Query(query): Query<BTreeMap<String, String>>, headers: HeaderMap) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(Echo { query, headers })
}

async fn upload(mut multipart: Multipart) -> Result<Json<Vec<Upload>>, (StatusCode, String)> {
    let bad_request = |e: axum::extract::multipart::MultipartError| (StatusCode::BAD_REQUEST, e.to_string());
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let text = field.text().await.map_err(bad_request)?;
        uploads.push(Upload {
            name,
            filename,
            content_type,
            text,
        });
    }
    info!(parts = uploads.len(), "received upload");
    Ok(Json(uploads))
}

async fn slow(Query(delay): Query<Delay>) -> Json<String> {
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    Json("done".to_string())
}
