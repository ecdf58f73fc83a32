use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, Post, ServerTime, Upload, TOKEN};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn form_request(uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.to_string())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- server time ---

#[tokio::test]
async fn server_time_requires_token() {
    let resp = app().oneshot(get("/lemon/getServerTime")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn server_time_with_token() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/lemon/getServerTime")
                .header("X-Token", TOKEN)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let time: ServerTime = body_json(resp).await;
    assert!(time.millis > 0);
}

// --- form query ---

#[tokio::test]
async fn query_filters_by_type_and_pages() {
    let resp = app()
        .oneshot(form_request("/lemon/post/query", "type=article&page=2&pageSize=1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let posts: Vec<Post> = body_json(resp).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].key, "welcome");
}

#[tokio::test]
async fn query_without_paging_returns_all_of_type() {
    let resp = app()
        .oneshot(form_request("/lemon/post/query", "type=news"))
        .await
        .unwrap();
    let posts: Vec<Post> = body_json(resp).await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Launch day");
}

#[tokio::test]
async fn query_without_type_is_rejected() {
    let resp = app()
        .oneshot(form_request("/lemon/post/query", "page=1"))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

// --- get ---

#[tokio::test]
async fn get_post_not_found_carries_message() {
    let resp = app().oneshot(get("/lemon/post/missing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(&body_bytes(resp).await[..], b"no post `missing`");
}

// --- echo ---

#[tokio::test]
async fn echo_reports_query_and_headers() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/lemon/echo?q=a%20b&n=1")
                .header("X-Trace", "abc")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.query["q"], "a b");
    assert_eq!(echo.query["n"], "1");
    assert_eq!(echo.headers["x-trace"], "abc");
}

// --- upload ---

#[tokio::test]
async fn upload_lists_parts() {
    let body = "--B\r\n\
                Content-Disposition: form-data; name=\"title\"\r\n\r\nHi\r\n\
                --B\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
                Content-Type: text/plain\r\n\r\nline\r\n\
                --B--\r\n";
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/lemon/upload")
                .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=B")
                .body(body.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let parts: Vec<Upload> = body_json(resp).await;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "title");
    assert_eq!(parts[0].text, "Hi");
    assert_eq!(parts[1].filename.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    assert_eq!(parts[1].text, "line");
}

// --- lifecycle ---

#[tokio::test]
async fn create_get_delete_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/lemon/post/body",
            r#"{"type":"article","title":"Fresh"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Post = body_json(resp).await;
    assert_eq!(created.title, "Fresh");
    let key = created.key;

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/lemon/post/{key}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Post = body_json(resp).await;
    assert_eq!(fetched.kind, "article");

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(
            Request::builder()
                .method("DELETE")
                .uri(&format!("/lemon/post/{key}"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/lemon/post/{key}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_with_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/lemon/post/body", r#"{"type":"article"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
