use std::{io, time::Duration};

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use futures::channel::mpsc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tripboard::{
    config::AppConfig,
    db::{init_pool, run_migrations, DbPool},
    routes::create_router,
    state::AppState,
};

struct TestApp {
    router: Router,
    state: AppState,
    db: DbPool,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let db_path = root.path().join("api.sqlite");
        let config = AppConfig::with_database(format!("sqlite://{}", db_path.to_string_lossy()));
        let db = init_pool(&config.database_url).await.expect("pool");
        run_migrations(&db).await.expect("migrations");
        let state = AppState::build(config, db.clone()).await.expect("state");
        Self {
            router: create_router(state.clone()),
            state,
            db,
            _root: root,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status();
        (status, read_json(response).await)
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, cookie: &str, form: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(COOKIE, cookie)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Opens the board once and returns the session cookie to send back.
    async fn visitor_cookie(&self) -> String {
        let response = self.get("/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let header = response
            .headers()
            .get(SET_COOKIE)
            .expect("first visit sets a session cookie")
            .to_str()
            .unwrap();
        header.split(';').next().unwrap().to_string()
    }

    async fn session(&self, cookie: &str) -> Value {
        read_json(self.get("/api/session", Some(cookie)).await).await
    }

    async fn page(&self, cookie: &str) -> String {
        let response = self.get("/", Some(cookie)).await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 page")
    }

    /// Creates a trip through the board page and returns its id.
    async fn selected_new_trip(&self, cookie: &str) -> String {
        self.post_form("/trips", cookie, "name=Kyoto+Spring&location=Kyoto").await;
        self.session(cookie).await["selected_trip"]
            .as_str()
            .expect("new trip is selected")
            .to_string()
    }
}

const BOUNDARY: &str = "tripboardboundary";

fn text_part(name: &str, value: &str) -> String {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
}

fn file_part_header(filename: &str, content_type: &str) -> String {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
}

fn closing() -> String {
    format!("\r\n--{BOUNDARY}--\r\n")
}

fn upload_request(cookie: &str, body: Body, length: usize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/suggestions/image")
        .header(COOKIE, cookie)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .header(CONTENT_LENGTH, length)
        .body(body)
        .unwrap()
}

async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
}

#[tokio::test]
async fn trips_are_created_listed_and_validated() {
    let app = TestApp::new().await;

    let (status, trip) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto", "start_date": "2025-04-01" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["name"], "Kyoto Spring");
    assert_eq!(trip["end_date"], "");

    let (status, body) = app
        .json("POST", "/api/trips", json!({ "name": " ", "location": "Kyoto" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, Value::String("trip name is required".into()));

    let (status, trips) = app.json("GET", "/api/trips", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trips.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn ranked_board_reflects_votes() {
    let app = TestApp::new().await;
    let (_, trip) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto" }))
        .await;
    let trip_id = trip["id"].as_str().unwrap();

    let (status, card) = app
        .json(
            "POST",
            &format!("/api/trips/{trip_id}/suggestions"),
            json!({ "category": "food", "title": "Ramen Shop" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(card["votes"], json!([]));
    let card_id = card["id"].as_str().unwrap();

    for voter in ["Alice", "Bob"] {
        let (status, _) = app
            .json("POST", &format!("/api/suggestions/{card_id}/votes"), json!({ "voter": voter }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app
        .json("POST", &format!("/api/suggestions/{card_id}/votes"), json!({ "voter": "Alice" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, board) = app
        .json("GET", &format!("/api/trips/{trip_id}/board"), Value::Null)
        .await;
    assert_eq!(board["trip"]["id"], trip_id);
    assert_eq!(board["columns"][1]["category"], "food");
    assert_eq!(board["columns"][1]["cards"][0]["votes"], json!(["Alice", "Bob"]));
    assert_eq!(board["columns"][0]["cards"], json!([]));
}

#[tokio::test]
async fn editing_rejects_blank_titles_and_keeps_votes() {
    let app = TestApp::new().await;
    let (_, trip) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto" }))
        .await;
    let (_, card) = app
        .json(
            "POST",
            &format!("/api/trips/{}/suggestions", trip["id"].as_str().unwrap()),
            json!({ "title": "Ryokan" }),
        )
        .await;
    assert_eq!(card["category"], "lodging");
    let card_uri = format!("/api/suggestions/{}", card["id"].as_str().unwrap());
    app.json("POST", &format!("{card_uri}/votes"), json!({ "voter": "Alice" }))
        .await;

    let (status, _) = app.json("PUT", &card_uri, json!({ "title": "" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, edited) = app
        .json("PUT", &card_uri, json!({ "category": "sights", "title": "Kiyomizu-dera", "link": "https://example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["category"], "sights");
    assert_eq!(edited["votes"], json!(["Alice"]));

    let (status, _) = app
        .json("PUT", "/api/suggestions/missing", json!({ "title": "Ghost" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn deleting_a_trip_cascades() {
    let app = TestApp::new().await;
    let (_, trip) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto" }))
        .await;
    let trip_id = trip["id"].as_str().unwrap();
    for title in ["Ramen Shop", "JR Pass"] {
        app.json(
            "POST",
            &format!("/api/trips/{trip_id}/suggestions"),
            json!({ "title": title }),
        )
        .await;
    }

    let (status, body) = app
        .json("DELETE", &format!("/api/trips/{trip_id}"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_suggestions"], 2);

    let (_, cards) = app
        .json("GET", &format!("/api/trips/{trip_id}/suggestions"), Value::Null)
        .await;
    assert_eq!(cards, json!([]));

    let (status, _) = app
        .json("DELETE", "/api/suggestions/never-existed", Value::Null)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn board_page_drives_the_view_state() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;

    let response = app.post_form("/modal/trip", &cookie, "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    assert_eq!(app.session(&cookie).await["modal"]["kind"], "new_trip");

    // blank location: silently ignored, form stays open with the draft
    app.post_form("/trips", &cookie, "name=Kyoto+Spring&location=").await;
    let session = app.session(&cookie).await;
    assert_eq!(session["modal"]["kind"], "new_trip");
    assert_eq!(session["trip_draft"]["name"], "Kyoto Spring");
    assert_eq!(session["notice"], Value::Null);

    app.post_form("/trips", &cookie, "name=Kyoto+Spring&location=Kyoto&start_date=2025-04-01&end_date=2025-04-07")
        .await;
    let session = app.session(&cookie).await;
    assert_eq!(session["modal"]["kind"], "closed");
    let trip_id = session["selected_trip"].as_str().expect("new trip is selected").to_string();

    let page = app.get("/", Some(&cookie)).await;
    let html = String::from_utf8(to_bytes(page.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(html.contains("Kyoto Spring"));
    assert!(html.contains("2025-04-01 ~ 2025-04-07"));

    app.post_form(&format!("/trips/{trip_id}/delete"), &cookie, "").await;
    assert_eq!(app.session(&cookie).await["selected_trip"], Value::Null);
}

#[tokio::test]
async fn uploaded_image_lands_on_the_new_card() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.post_form("/trips", &cookie, "name=Kyoto+Spring&location=Kyoto").await;
    let trip_id = app.session(&cookie).await["selected_trip"]
        .as_str()
        .unwrap()
        .to_string();

    app.post_form("/suggestions/new", &cookie, "").await;

    let boundary = "tripboardboundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"ramen.png\"\r\n\
         Content-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/suggestions/image")
        .header(COOKIE, &cookie)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::SEE_OTHER);

    let session = app.session(&cookie).await;
    assert_eq!(session["upload"]["kind"], "idle");
    assert_eq!(session["suggestion_draft"]["image"], "data:image/png;base64,UE5HREFUQQ==");

    app.post_form("/suggestions", &cookie, "category=food&title=Ramen+Shop").await;
    let (_, cards) = app
        .json("GET", &format!("/api/trips/{trip_id}/suggestions"), Value::Null)
        .await;
    assert_eq!(cards[0]["title"], "Ramen Shop");
    assert_eq!(cards[0]["image"], "data:image/png;base64,UE5HREFUQQ==");
    assert_eq!(app.session(&cookie).await["modal"]["kind"], "closed");
}

#[tokio::test]
async fn non_image_upload_is_discarded_quietly() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.post_form("/suggestions/new", &cookie, "").await;

    let boundary = "tripboardboundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/suggestions/image")
        .header(COOKIE, &cookie)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    app.send(request).await;

    let session = app.session(&cookie).await;
    assert_eq!(session["upload"]["kind"], "idle");
    assert_eq!(session["suggestion_draft"]["image"], "");
    assert_eq!(session["notice"], Value::Null);
}

#[tokio::test]
async fn voting_from_the_board_closes_the_dialog() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.post_form("/trips", &cookie, "name=Kyoto+Spring&location=Kyoto").await;
    app.post_form("/suggestions/new", &cookie, "").await;
    app.post_form("/suggestions", &cookie, "category=sights&title=Kinkaku-ji").await;

    let trip_id = app.session(&cookie).await["selected_trip"]
        .as_str()
        .unwrap()
        .to_string();
    let (_, cards) = app
        .json("GET", &format!("/api/trips/{trip_id}/suggestions"), Value::Null)
        .await;
    let card_id = cards[0]["id"].as_str().unwrap().to_string();

    app.post_form(&format!("/suggestions/{card_id}/vote"), &cookie, "").await;
    assert_eq!(app.session(&cookie).await["modal"]["suggestion_id"], card_id.as_str());

    app.post_form("/votes", &cookie, "voter_name=Alice").await;
    assert_eq!(app.session(&cookie).await["modal"]["kind"], "closed");

    // a repeated vote still closes the dialog without a notice
    app.post_form(&format!("/suggestions/{card_id}/vote"), &cookie, "").await;
    app.post_form("/votes", &cookie, "voter_name=Alice").await;
    let session = app.session(&cookie).await;
    assert_eq!(session["modal"]["kind"], "closed");
    assert_eq!(session["notice"], Value::Null);

    let (_, cards) = app
        .json("GET", &format!("/api/trips/{trip_id}/suggestions"), Value::Null)
        .await;
    assert_eq!(cards[0]["votes"], json!(["Alice"]));
}

#[tokio::test]
async fn blank_voter_keeps_the_dialog_open() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.selected_new_trip(&cookie).await;
    app.post_form("/suggestions/new", &cookie, "").await;
    app.post_form("/suggestions", &cookie, "category=food&title=Ramen+Shop").await;
    let card_id = app.state.board.snapshot().suggestions[0].id.clone();

    app.post_form(&format!("/suggestions/{card_id}/vote"), &cookie, "").await;
    app.post_form("/votes", &cookie, "voter_name=+++").await;
    let session = app.session(&cookie).await;
    assert_eq!(session["modal"]["kind"], "vote");
    assert_eq!(session["modal"]["suggestion_id"], card_id.as_str());
    assert_eq!(session["notice"], Value::Null);
    assert!(app.state.board.snapshot().suggestions[0].votes.is_empty());
}

#[tokio::test]
async fn script_links_are_refused() {
    let app = TestApp::new().await;
    let (_, trip) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto" }))
        .await;
    let cards_uri = format!("/api/trips/{}/suggestions", trip["id"].as_str().unwrap());

    let (status, body) = app
        .json(
            "POST",
            &cards_uri,
            json!({ "title": "Ramen Shop", "link": "javascript:fetch('/trips/'+1+'/delete',{method:'POST'})" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, Value::String("link must be an http or https address".into()));

    let (status, card) = app
        .json("POST", &cards_uri, json!({ "title": "Ramen Shop", "link": "https://ramen.example" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .json(
            "PUT",
            &format!("/api/suggestions/{}", card["id"].as_str().unwrap()),
            json!({ "title": "Ramen Shop", "link": "javascript:alert(1)" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let cookie = app.visitor_cookie().await;
    let html = app.page(&cookie).await;
    assert!(html.contains("href=\"https://ramen.example\""));
    assert!(!html.contains("javascript:"));
}

#[tokio::test]
async fn read_only_visits_leave_no_session() {
    let app = TestApp::new().await;
    for _ in 0..25 {
        assert_eq!(app.get("/", None).await.status(), StatusCode::OK);
    }
    assert_eq!(app.state.sessions.count().await, 0);

    let (_, first) = app
        .json("POST", "/api/trips", json!({ "name": "Kyoto Spring", "location": "Kyoto" }))
        .await;
    app.json("POST", "/api/trips", json!({ "name": "Osaka Weekend", "location": "Osaka" }))
        .await;

    // the page auto-selects the first trip without storing anything
    let cookie = app.visitor_cookie().await;
    assert!(app.page(&cookie).await.contains("<h2>Kyoto Spring</h2>"));
    assert_eq!(app.state.sessions.count().await, 0);

    // deleting the trip on screen leaves nothing selected
    let first_id = first["id"].as_str().unwrap();
    app.post_form(&format!("/trips/{first_id}/delete"), &cookie, "").await;
    assert_eq!(app.state.sessions.count().await, 1);
    assert_eq!(app.session(&cookie).await["selected_trip"], Value::Null);
    assert!(app.page(&cookie).await.contains("Pick a trip on the left"));
}

#[tokio::test]
async fn uploading_keeps_what_was_typed() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.selected_new_trip(&cookie).await;
    app.post_form("/suggestions/new", &cookie, "").await;

    let body = [
        text_part("category", "food"),
        text_part("title", "Nishiki Market"),
        text_part("location", "Nakagyo"),
        text_part("description", "Pickles and tamagoyaki"),
        text_part("image_url", ""),
        text_part("link", "https://nishiki.example"),
        file_part_header("market.png", "image/png"),
        "PNGDATA".to_string(),
        closing(),
    ]
    .concat();
    let length = body.len();
    let response = app.send(upload_request(&cookie, Body::from(body), length)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let draft = app.session(&cookie).await["suggestion_draft"].clone();
    assert_eq!(draft["category"], "food");
    assert_eq!(draft["title"], "Nishiki Market");
    assert_eq!(draft["location"], "Nakagyo");
    assert_eq!(draft["link"], "https://nishiki.example");
    assert_eq!(draft["image"], "data:image/png;base64,UE5HREFUQQ==");

    // a rejected file still keeps the text and the previous image
    let body = [
        text_part("category", "food"),
        text_part("title", "Nishiki Market (morning)"),
        file_part_header("notes.txt", "text/plain"),
        "hello".to_string(),
        closing(),
    ]
    .concat();
    let length = body.len();
    app.send(upload_request(&cookie, Body::from(body), length)).await;
    let session = app.session(&cookie).await;
    assert_eq!(session["upload"]["kind"], "idle");
    assert_eq!(session["suggestion_draft"]["title"], "Nishiki Market (morning)");
    assert_eq!(session["suggestion_draft"]["image"], "data:image/png;base64,UE5HREFUQQ==");
    assert_eq!(session["modal"]["kind"], "suggestion");
}

#[tokio::test]
async fn upload_progress_is_visible_while_the_body_arrives() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.post_form("/suggestions/new", &cookie, "").await;

    let image = vec![b'P'; 64 * 1024];
    let (head, tail) = image.split_at(image.len() / 2);
    let mut first = file_part_header("ramen.png", "image/png").into_bytes();
    first.extend_from_slice(head);
    let mut rest = tail.to_vec();
    rest.extend_from_slice(closing().as_bytes());
    let length = first.len() + rest.len();

    let (tx, rx) = mpsc::unbounded::<Result<Bytes, io::Error>>();
    let router = app.router.clone();
    let request = upload_request(&cookie, Body::from_stream(rx), length);
    let upload = tokio::spawn(async move { router.oneshot(request).await });

    tx.unbounded_send(Ok(Bytes::from(first))).unwrap();
    let mut seen = None;
    for _ in 0..200 {
        let session = app.session(&cookie).await;
        let percent = session["upload"]["percent"].as_u64().unwrap_or(0);
        if session["upload"]["kind"] == "in_progress" && percent > 0 {
            seen = Some(percent);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let percent = seen.expect("progress is reported before the upload completes");
    assert!(percent < 100);

    tx.unbounded_send(Ok(Bytes::from(rest))).unwrap();
    drop(tx);
    let response = upload.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let session = app.session(&cookie).await;
    assert_eq!(session["upload"]["kind"], "idle");
    assert!(session["suggestion_draft"]["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,UFBQ"));
}

#[tokio::test]
async fn failed_write_keeps_the_form_and_reports_the_cause() {
    let app = TestApp::new().await;
    let cookie = app.visitor_cookie().await;
    app.post_form("/modal/trip", &cookie, "").await;

    sqlx::query("DROP TABLE trips").execute(&app.db).await.unwrap();
    let response = app
        .post_form("/trips", &cookie, "name=Kyoto+Spring&location=Kyoto")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let session = app.session(&cookie).await;
    let notice = session["notice"].as_str().expect("a notice is shown");
    assert!(notice.contains("no such table: trips"), "{notice}");
    assert_eq!(session["modal"]["kind"], "new_trip");
    assert_eq!(session["trip_draft"]["name"], "Kyoto Spring");
    assert_eq!(session["trip_draft"]["location"], "Kyoto");
    assert_eq!(session["selected_trip"], Value::Null);

    let (_, trips) = app.json("GET", "/api/trips", Value::Null).await;
    assert_eq!(trips, json!([]));

    app.post_form("/notice/dismiss", &cookie, "").await;
    let session = app.session(&cookie).await;
    assert_eq!(session["notice"], Value::Null);
    assert_eq!(session["modal"]["kind"], "new_trip");
}

#[tokio::test]
async fn board_script_reloads_on_any_other_version() {
    let app = TestApp::new().await;
    let response = app.get("/static/board.js", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let script = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(),
    )
    .unwrap();
    assert!(script.contains("version !== shown"));
    assert!(!script.contains("version > shown"));
}
