//! Wire-level tests of the reqwest transport against a mock server.

use std::io::Write;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crds_submit::{Session, SessionConfig, SubmitError};

const LOGIN_FORM: &str = r#"<html><head><title>CRDS</title></head><body>
    <form method="post"><input type="hidden" name="csrfmiddlewaretoken" value="form-tok"></form>
    </body></html>"#;

fn open(server: &MockServer) -> Session {
    let config = SessionConfig::new(server.uri())
        .with_credentials("alice", "s3cret")
        .with_instrument("miri");
    Session::connect(config).unwrap()
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

fn posts(requests: &[Request]) -> Vec<&Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect()
}

#[tokio::test]
async fn test_login_round_trip_keeps_redirect_cookies() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(LOGIN_FORM)
                .insert_header("set-cookie", "csrftoken=cookie-tok; Path=/"),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login/"))
        .and(body_string_contains("csrfmiddlewaretoken=form-tok"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/")
                .insert_header("set-cookie", "sessionid=sess-1; Path=/; HttpOnly"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Welcome</html>"))
        .mount(&server)
        .await;

    let session = open(&server);
    session.login("/").await.unwrap();
    assert_eq!(session.cookie("sessionid").as_deref(), Some("sess-1"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].method.as_str(), "GET");
    assert_eq!(requests[1].method.as_str(), "POST");
    assert_eq!(
        header(&requests[1], "cookie"),
        Some("ASB-AUTH=s3cret; csrftoken=cookie-tok")
    );
    assert_eq!(header(&requests[1], "referer"), Some(server.uri().as_str()));

    let body = String::from_utf8_lossy(&requests[1].body);
    assert!(body.contains("username=alice"));
    assert!(body.contains("instrument=miri"));

    // The redirect target sees the cookie issued by the 302.
    let landing = header(&requests[2], "cookie").unwrap();
    assert!(landing.contains("sessionid=sess-1"), "{landing}");
}

#[tokio::test]
async fn test_server_error_status_is_transaction_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lock_status/alice/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let session = open(&server);
    let err = session.fail_if_existing_lock().await.unwrap_err();
    assert!(matches!(err, SubmitError::ServerTransaction { .. }), "{err}");
    assert_eq!(err.error_count(), 1);
}

#[tokio::test]
async fn test_lock_status_json_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lock_status/alice/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "miri", "user": "alice", "type": "instrument", "is_expired": false,
            "status": "ok", "time_remaining": "1:00:00", "created_on": "2024-01-01 00:00:00"
        })))
        .mount(&server)
        .await;

    let session = open(&server);
    let err = session.fail_if_existing_lock().await.unwrap_err();
    assert!(matches!(err, SubmitError::LockConflict { .. }));
}

#[tokio::test]
async fn test_small_upload_is_one_multipart_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/upload/chunked/"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "csrftoken=tok-0; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/chunked/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("small_drk.fits");
    std::fs::File::create(&file)
        .unwrap()
        .write_all(b"SIMPLE  =                    T")
        .unwrap();

    let session = open(&server);
    let report = session.upload_file(&file).await.unwrap();
    assert_eq!(report.requests, 1);

    let requests = server.received_requests().await.unwrap();
    let posts = posts(&requests);
    assert_eq!(posts.len(), 1);
    assert!(header(posts[0], "content-range").is_none());
    assert!(header(posts[0], "content-type")
        .unwrap()
        .starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&posts[0].body);
    assert!(body.contains(r#"name="csrfmiddlewaretoken""#));
    assert!(body.contains("tok-0"));
    assert!(body.contains(r#"name="files"; filename="small_drk.fits""#));
    assert!(body.contains("SIMPLE  ="));
}

#[tokio::test]
async fn test_chunked_upload_sends_content_ranges() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/upload/chunked/"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "csrftoken=tok-0; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/chunked/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .insert_header("set-cookie", "csrftoken=tok-next; Path=/"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("big_flat.fits");
    std::fs::write(&file, vec![42u8; 4_000_000]).unwrap();

    let session = open(&server);
    let report = session.upload_file(&file).await.unwrap();
    assert_eq!(report.requests, 2);

    let requests = server.received_requests().await.unwrap();
    let posts = posts(&requests);
    let ranges: Vec<_> = posts
        .iter()
        .map(|r| header(r, "content-range").unwrap())
        .collect();
    assert_eq!(
        ranges,
        vec!["bytes 0-1999999/4000000", "bytes 2000000-3999999/4000000"]
    );
    assert!(String::from_utf8_lossy(&posts[0].body).contains("tok-0"));
    assert!(String::from_utf8_lossy(&posts[1].body).contains("tok-next"));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let session = Session::connect(SessionConfig::new("http://127.0.0.1:1")).unwrap();
    let err = session.get("/").await.unwrap_err();
    assert!(matches!(err, SubmitError::Transport(_)), "{err}");
    assert!(session.cookie("csrftoken").is_none());
}
