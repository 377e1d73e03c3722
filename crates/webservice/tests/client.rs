#![forbid(unsafe_code)]

use async_trait::async_trait;
use std::net::TcpListener;
use std::sync::Mutex;
use tempfile::tempdir;
use webservice::xmlrpc::Value;
use webservice::{
    CallError, Fingerprints, RecordService, RemoteErrorKind, StudentRecord, build_url,
    fetch_fingerprints, ping, store_fingerprint, store_fingerprint_with,
};
use wiremock::matchers::{body_string_contains, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("mgr:mgrpw")
const MANAGER_AUTH: &str = "Basic bWdyOm1ncnB3";

fn response(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n\
         <value>{value}</value>\n</param>\n</params>\n</methodResponse>\n"
    ))
}

fn fault(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<?xml version='1.0'?>\n<methodResponse>\n<fault>\n<value><struct>\n\
         <member>\n<name>faultCode</name>\n<value><int>{code}</int></value>\n</member>\n\
         <member>\n<name>faultString</name>\n<value><string>{message}</string></value>\n</member>\n\
         </struct></value>\n</fault>\n</methodResponse>\n"
    ))
}

/// A record server that only answers the manager account.
async fn kofa() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .mount(&server)
        .await;
    server
}

fn manager_url(server: &MockServer) -> String {
    build_url(&server.uri(), "mgr", "mgrpw").unwrap()
}

fn fake_fpm_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("data.fpm");
    std::fs::write(&path, b"FP1-faked-fpm-file").unwrap();
    path
}

#[tokio::test]
async fn store_fingerprint_succeeds() {
    let server = kofa().await;
    Mock::given(method("POST"))
        .and(header("Authorization", MANAGER_AUTH))
        .and(body_string_contains("<methodName>put_student_fingerprints</methodName>"))
        .and(body_string_contains("<string>AB123456</string>"))
        .and(body_string_contains("<name>1</name>"))
        // base64("FP1-faked-fpm-file")
        .and(body_string_contains("RlAxLWZha2VkLWZwbS1maWxl"))
        .respond_with(response("<boolean>1</boolean>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let result = store_fingerprint(&manager_url(&server), "AB123456", 1, fake_fpm_file(&dir)).await;
    assert_eq!(result, Ok(true));
}

#[tokio::test]
async fn store_fingerprint_unauthorized() {
    let server = kofa().await;
    let dir = tempdir().unwrap();

    let err = store_fingerprint(&server.uri(), "AB123456", 1, fake_fpm_file(&dir))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Error: 401 Unauthorized");
    assert_eq!(err.kind(), RemoteErrorKind::Auth);
}

#[tokio::test]
async fn store_fingerprint_fault() {
    let server = kofa().await;
    Mock::given(method("POST"))
        .and(header("Authorization", MANAGER_AUTH))
        .respond_with(fault(1, "Invalid student_id"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = store_fingerprint(&manager_url(&server), "invalid-id", 1, fake_fpm_file(&dir))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Error 1: Invalid student_id");
    assert_eq!(err.kind(), RemoteErrorKind::Fault);
}

#[tokio::test]
async fn store_fingerprint_unreachable_server() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempdir().unwrap();

    let url = build_url(&format!("http://127.0.0.1:{port}"), "mgr", "mgrpw").unwrap();
    let err = store_fingerprint(&url, "AB123456", 1, fake_fpm_file(&dir))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Error:"), "{message}");
    assert!(message.contains("Connection refused"), "{message}");
    assert_eq!(err.kind(), RemoteErrorKind::Transport);
}

#[tokio::test]
async fn store_fingerprint_missing_data_file() {
    let server = kofa().await;
    let dir = tempdir().unwrap();

    let err = store_fingerprint(
        &manager_url(&server),
        "AB123456",
        1,
        dir.path().join("data.fpm"),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().starts_with("Error: "));
    assert_eq!(err.kind(), RemoteErrorKind::Unexpected);
}

#[tokio::test]
async fn server_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = store_fingerprint(&manager_url(&server), "AB123456", 1, fake_fpm_file(&dir))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Error: 500 Internal Server Error");
    assert_eq!(err.kind(), RemoteErrorKind::Protocol);
}

#[tokio::test]
async fn fetch_fingerprints_returns_record() {
    let server = kofa().await;
    Mock::given(method("POST"))
        .and(header("Authorization", MANAGER_AUTH))
        .and(body_string_contains("get_student_fingerprints"))
        .and(body_string_contains("AB123456"))
        .respond_with(response(
            "<struct>\n\
             <member>\n<name>email</name>\n<value><string>foo@sample.org</string></value>\n</member>\n\
             <member>\n<name>firstname</name>\n<value><string>foo</string></value>\n</member>\n\
             <member>\n<name>lastname</name>\n<value><string>bar</string></value>\n</member>\n\
             <member>\n<name>img_name</name>\n<value><string>passport.png</string></value>\n</member>\n\
             <member>\n<name>img</name>\n<value><base64>\nRmFrZWRQTkdGaWxl\n</base64></value>\n</member>\n\
             <member>\n<name>fingerprints</name>\n<value><struct>\n\
             <member>\n<name>1</name>\n<value><base64>\nRlAxRmFrZQ==\n</base64></value>\n</member>\n\
             </struct></value>\n</member>\n\
             </struct>",
        ))
        .mount(&server)
        .await;

    let record = fetch_fingerprints(&manager_url(&server), "AB123456")
        .await
        .unwrap();
    assert_eq!(record.email.as_deref(), Some("foo@sample.org"));
    assert_eq!(record.firstname.as_deref(), Some("foo"));
    assert_eq!(record.lastname.as_deref(), Some("bar"));
    assert_eq!(record.img_name.as_deref(), Some("passport.png"));
    assert_eq!(record.img.as_deref(), Some(&b"FakedPNGFile"[..]));
    assert_eq!(record.fingerprints.get("1").map(Vec::as_slice), Some(&b"FP1Fake"[..]));
}

#[tokio::test]
async fn fetch_fingerprints_unknown_student() {
    let server = kofa().await;
    Mock::given(method("POST"))
        .and(header("Authorization", MANAGER_AUTH))
        .respond_with(response("<struct></struct>"))
        .mount(&server)
        .await;

    let record = fetch_fingerprints(&manager_url(&server), "InvalidID")
        .await
        .unwrap();
    assert!(record.is_empty());
}

#[tokio::test]
async fn fetch_fingerprints_wrong_credentials() {
    let server = kofa().await;
    let url = build_url(&server.uri(), "illegal", "mgrpw").unwrap();

    let err = fetch_fingerprints(&url, "AB123456").await.unwrap_err();
    assert_eq!(err.to_string(), "Error: 401 Unauthorized");
}

#[tokio::test]
async fn garbage_answer_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = fetch_fingerprints(&manager_url(&server), "AB123456")
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Error: "));
    assert_eq!(err.kind(), RemoteErrorKind::Unexpected);
}

#[tokio::test]
async fn ping_pong() {
    let server = kofa().await;
    Mock::given(method("POST"))
        .and(header("Authorization", MANAGER_AUTH))
        .and(body_string_contains("<methodName>ping</methodName>"))
        .respond_with(response(
            "<array><data>\n<value><string>pong</string></value>\n\
             <value><int>42</int></value>\n</data></array>",
        ))
        .mount(&server)
        .await;

    assert_eq!(ping(&manager_url(&server)).await, Ok(()));
    assert_eq!(
        ping(&server.uri()).await.unwrap_err().kind(),
        RemoteErrorKind::Auth
    );
}

#[derive(Default)]
struct RecordingService {
    stored: Mutex<Vec<(String, Fingerprints)>>,
}

#[async_trait]
impl RecordService for RecordingService {
    async fn put_student_fingerprints(
        &self,
        student_id: &str,
        fingerprints: Fingerprints,
    ) -> Result<bool, CallError> {
        let stored = !fingerprints.is_empty();
        self.stored
            .lock()
            .unwrap()
            .push((student_id.to_owned(), fingerprints));
        Ok(stored)
    }

    async fn get_student_fingerprints(
        &self,
        _student_id: &str,
    ) -> Result<StudentRecord, CallError> {
        Ok(StudentRecord::default())
    }

    async fn ping(&self, value: i64) -> Result<Value, CallError> {
        Ok(Value::Array(vec![Value::from("pong"), Value::Int(value)]))
    }
}

#[tokio::test]
async fn store_through_any_service() {
    let service = RecordingService::default();
    let dir = tempdir().unwrap();

    let result = store_fingerprint_with(&service, "AB123456", 7, fake_fpm_file(&dir)).await;
    assert_eq!(result, Ok(true));

    let stored = service.stored.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, "AB123456");
    assert_eq!(stored[0].1["7"], b"FP1-faked-fpm-file");
}
