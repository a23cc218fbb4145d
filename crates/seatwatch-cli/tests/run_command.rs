//! End-to-end command runs against a mock portal and push endpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use seatwatch::{
    ActionMode, CancelSignal, CourseCategory, SemesterState, TrackedCourses, TrackerError,
    TrackingOutcome,
};
use seatwatch_cli::commands;
use seatwatch_cli::{Config, SessionStore, StoredSession};

// ─────────────────────── helpers ───────────────────────

const LOGIN_PAGE: &str = r#"<html><body>
    <form class="form-horizontal" method="post" action="/login_check">
      <input type="text" name="_username" />
      <input type="password" name="_password" />
    </form></body></html>"#;

const ENROLMENT_PAGE: &str = r#"<html><body>
    <form id="frmEnrolment" action="/enrolment/submit" method="post">
    <input type="hidden" name="form[_token]" value="abc" />
    <table class="table tbl-courses">
      <tr><th>#</th><th>Code</th><th>Name</th></tr>
      <tr><th>Sem 1</th><th>Sem 2</th><th>Sem 3</th></tr>
      <tr><td>1</td><td>COSC2657</td><td>Mobile Application Development</td><td>12</td>
          <td></td><td><input type="checkbox" name="form[courses][COSC2657-SEM2]" value="1" /></td><td></td></tr>
    </table>
    <div id="programElective"><table>
      <tr><th>Code</th><th>Name</th></tr>
      <tr><td>EEET2574</td><td>Robotics</td><td>12</td><td></td><td></td><td><i class="fa fa-check"></i></td><td></td><td></td></tr>
    </table></div>
    <div id="generalElective"><table><tr><th>Code</th></tr></table></div>
    </form></body></html>"#;

async fn mount_portal(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login_check"))
        .and(body_string_contains("_password=hunter2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "PHPSESSID=s3cret; Path=/")
                .set_body_string("<html>Welcome</html>"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/enrolment"))
        .and(header("cookie", "PHPSESSID=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ENROLMENT_PAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/enrolment"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .with_priority(10)
        .mount(server)
        .await;
}

fn config(server: &MockServer, session_file: &Path) -> Config {
    Config {
        portal_url: server.uri(),
        username: Some("s1234567".into()),
        password: Some("hunter2".into()),
        semester: 2,
        mode: ActionMode::Enroll,
        refresh_secs: 1,
        tracked: TrackedCourses {
            roadmap: vec!["COSC2657".into()],
            program_elective: vec!["EEET2574".into()],
            general_elective: Vec::new(),
        },
        session_file: Some(session_file.to_path_buf()),
        timeout_ms: 5_000,
        ..Config::default()
    }
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_run_enrolls_and_saves_session() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    Mock::given(method("POST"))
        .and(path("/enrolment/submit"))
        .and(body_string_contains("COSC2657-SEM2%5D=1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"success": true, "message": "Enrolled"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    let config = config(&server, &session_file);

    let outcome = commands::run(&config, &CancelSignal::new()).await.unwrap();
    assert_eq!(
        outcome,
        TrackingOutcome::Enrolled {
            message: "Enrolled".into(),
            cycles: 1
        }
    );

    let saved = SessionStore::new(&session_file).load(&config.portal_url).unwrap();
    assert_eq!(saved.cookies, vec!["PHPSESSID=s3cret".to_string()]);
}

#[tokio::test]
async fn test_run_reuses_saved_session() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    Mock::given(method("POST"))
        .and(path("/enrolment/submit"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"success": true, "message": "OK"}"#),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    let config = config(&server, &session_file);
    SessionStore::new(&session_file)
        .save(&StoredSession::new(&config.portal_url, vec!["PHPSESSID=s3cret".into()]))
        .unwrap();

    commands::run(&config, &CancelSignal::new()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/login_check"));
}

#[tokio::test]
async fn test_rejected_saved_session_is_discarded() {
    let server = MockServer::start().await;
    mount_portal(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    let mut config = config(&server, &session_file);
    config.password = Some("changed".into());
    SessionStore::new(&session_file)
        .save(&StoredSession::new(&config.portal_url, vec!["PHPSESSID=stale".into()]))
        .unwrap();

    let err = commands::run(&config, &CancelSignal::new()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TrackerError>(),
        Some(TrackerError::Authentication(_))
    ));
    assert!(!session_file.exists());
}

#[tokio::test]
async fn test_run_notify_mode_pushes_until_cancelled() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/pushes"))
        .and(header("Access-Token", "o.token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server, &dir.path().join("session.json"));
    config.mode = ActionMode::Notify;
    config.semester = 1;
    config.refresh_secs = 3600;
    config.pushbullet_token = Some("o.token".into());
    config.pushbullet_endpoint = Some(format!("{}/v2/pushes", server.uri()));

    let cancel = Arc::new(CancelSignal::new());
    let stopper = Arc::clone(&cancel);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stopper.cancel();
    });

    let outcome = commands::run(&config, &cancel).await.unwrap();
    assert_eq!(outcome, TrackingOutcome::Cancelled { cycles: 1 });

    let pushes: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v2/pushes")
        .collect();
    assert_eq!(pushes.len(), 1);
    assert!(String::from_utf8_lossy(&pushes[0].body).contains("EEET2574"));
}

#[tokio::test]
async fn test_run_rejects_invalid_config_before_network() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server, &dir.path().join("session.json"));
    config.semester = 5;

    assert!(commands::run(&config, &CancelSignal::new()).await.is_err());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_catalog_lists_all_sections() {
    let server = MockServer::start().await;
    mount_portal(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir.path().join("session.json"));

    let courses = commands::catalog(&config).await.unwrap();
    let codes: Vec<&str> = courses.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["COSC2657", "EEET2574"]);
    assert_eq!(courses[0].semesters[1], SemesterState::Available);
    assert_eq!(courses[1].category, CourseCategory::ProgramElective);
    assert_eq!(courses[1].semesters[0], SemesterState::Available);
}

#[tokio::test]
async fn test_login_command_writes_session_file() {
    let server = MockServer::start().await;
    mount_portal(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("sub/session.json");
    let config = config(&server, &session_file);

    let store = commands::login(&config).await.unwrap();
    assert_eq!(store.path(), session_file.as_path());
    assert!(store.load(&config.portal_url).is_some());
}
