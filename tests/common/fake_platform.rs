//! In-process stand-in for the orchestration platform and the deployed site.
//!
//! One axum server answers both the platform API under `/api/1/` and the PetClinic pages under
//! `/petclinic/`. It runs on its own thread with a current-thread runtime so tests can drive it
//! with the blocking client.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use petclinic_suite::checks::{APP_HOSTS, DBMS, DB_HOST, DB_PORT, ENTRY_URL};
use petclinic_suite::scenarios::{CLUSTER_SIZE, SCM_BRANCH, UPDATED_BRANCH, UPDATED_MARKER, WELCOME_MARKER};
use petclinic_suite::PlatformClient;
use serde_json::{json, Map, Value};

use super::{BASIC_AUTH, PASSWORD, USER};

/// Everything the fake remembers, readable and tweakable from tests.
#[derive(Debug)]
pub struct World {
    pub base: String,
    pub port: u16,
    /// `GET instances/{id}` answers `Launching` this many times after a launch.
    pub launch_polls: usize,
    /// `GET instances/{id}` answers `Executing` this many times after a reconfigure.
    pub settle_polls: usize,
    /// Overrides the computed status on every poll.
    pub stuck_status: Option<&'static str>,
    /// Port published as `db-port`; defaults to the server's own port.
    pub db_port: u16,
    pub fail_launch: bool,
    pub fail_upload: bool,
    pub site_status: u16,
    /// Served instead of the branch's page when set.
    pub site_body: Option<&'static str>,
    /// Answer the site after this delay; trips the site client's request timeout.
    pub site_delay: Duration,
    /// Number of page loads after a switch to the updated branch that still serve the old page.
    pub stale_pages: usize,
    /// When false, `petclinic.app-hosts` ignores `clusterSize` and stays at one host.
    pub scales: bool,

    pub requests: Vec<String>,
    pub auth: Vec<Option<String>>,
    pub environments: Vec<Value>,
    pub launches: Vec<Value>,
    pub reconfigures: Vec<Value>,
    pub live: HashSet<String>,
    pub parameters: Map<String, Value>,
    /// `(id, name)` of the organization's applications.
    pub applications: Vec<(String, String)>,
    /// `(application id, content type, manifest)` for every manifest upload.
    pub manifests: Vec<(String, Option<String>, String)>,
    stale_left: usize,
    pending: usize,
    pending_status: &'static str,
    next_id: usize,
}

impl World {
    fn new(port: u16) -> Self {
        Self {
            base: format!("http://127.0.0.1:{port}"),
            port,
            launch_polls: 2,
            settle_polls: 1,
            stuck_status: None,
            db_port: port,
            fail_launch: false,
            fail_upload: false,
            site_status: 200,
            site_body: None,
            site_delay: Duration::ZERO,
            stale_pages: 0,
            scales: true,
            requests: Vec::new(),
            auth: Vec::new(),
            environments: Vec::new(),
            launches: Vec::new(),
            reconfigures: Vec::new(),
            live: HashSet::new(),
            parameters: Map::new(),
            applications: Vec::new(),
            manifests: Vec::new(),
            stale_left: 0,
            pending: 0,
            pending_status: "Launching",
            next_id: 0,
        }
    }

    fn record(&mut self, line: String, headers: &HeaderMap) {
        self.requests.push(line);
        self.auth.push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(BASIC_AUTH)
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn status(&mut self) -> &'static str {
        if let Some(stuck) = self.stuck_status {
            return stuck;
        }
        if self.pending > 0 {
            self.pending -= 1;
            self.pending_status
        } else {
            "Running"
        }
    }

    fn cluster_size(&self) -> usize {
        if !self.scales {
            return 1;
        }
        match self.parameters.get(CLUSTER_SIZE) {
            Some(Value::String(s)) => s.parse().unwrap_or(1),
            Some(Value::Number(n)) => n.as_u64().unwrap_or(1) as usize,
            _ => 1,
        }
    }

    fn return_values(&self, status: &str) -> Value {
        if status != "Running" {
            return json!({});
        }
        let hosts: Vec<String> =
            (0..self.cluster_size()).map(|i| format!("10.0.0.{}", i + 10)).collect();
        json!({
            ENTRY_URL: format!("{}/petclinic/", self.base),
            APP_HOSTS: hosts,
            DBMS: { DB_HOST: "127.0.0.1", DB_PORT: self.db_port },
        })
    }

    fn branch(&self) -> &str {
        self.parameters.get(SCM_BRANCH).and_then(Value::as_str).unwrap_or("master")
    }
}

type Shared = Arc<Mutex<World>>;
type Reply = Result<Json<Value>, (StatusCode, String)>;

fn denied() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "bad credentials".to_string())
}

async fn create_environment(
    State(world): State<Shared>,
    Path(org): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut w = world.lock().unwrap();
    w.record(format!("POST organizations/{org}/environments"), &headers);
    if !World::authorized(&headers) {
        return Err(denied());
    }
    w.environments.push(body);
    let id = w.next_id("env");
    w.live.insert(id.clone());
    Ok(Json(json!({ "id": id })))
}

async fn destroy_environment(
    State(world): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut w = world.lock().unwrap();
    w.record(format!("DELETE environments/{id}"), &headers);
    if w.live.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("no environment {id}")))
    }
}

async fn launch(
    State(world): State<Shared>,
    Path(app): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut w = world.lock().unwrap();
    w.record(format!("POST applications/{app}/launch"), &headers);
    if !World::authorized(&headers) {
        return Err(denied());
    }
    w.launches.push(body.clone());
    if w.fail_launch {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "quota exceeded".to_string()));
    }
    let mut parameters = Map::new();
    parameters.insert(SCM_BRANCH.to_string(), json!("master"));
    parameters.insert(CLUSTER_SIZE.to_string(), json!("1"));
    if let Some(Value::Object(given)) = body.get("parameters") {
        parameters.extend(given.clone());
    }
    w.parameters = parameters;
    w.pending = w.launch_polls;
    w.pending_status = "Launching";
    let id = w.next_id("inst");
    w.live.insert(id.clone());
    Ok(Json(json!({ "id": id })))
}

async fn instance(
    State(world): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    let mut w = world.lock().unwrap();
    w.record(format!("GET instances/{id}"), &headers);
    if !w.live.contains(&id) {
        return Err((StatusCode::NOT_FOUND, format!("no instance {id}")));
    }
    let status = w.status();
    Ok(Json(json!({
        "id": id,
        "status": status,
        "returnValues": w.return_values(status),
        "parameters": w.parameters,
    })))
}

async fn reconfigure(
    State(world): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut w = world.lock().unwrap();
    w.record(format!("PUT instances/{id}/reconfigure"), &headers);
    if !w.live.contains(&id) {
        return Err((StatusCode::NOT_FOUND, format!("no instance {id}")));
    }
    if let Some(Value::Object(given)) = body.get("parameters") {
        let given = given.clone();
        w.parameters.extend(given);
    }
    if w.branch() == UPDATED_BRANCH {
        w.stale_left = w.stale_pages;
    }
    w.reconfigures.push(body);
    w.pending = w.settle_polls;
    w.pending_status = "Executing";
    Ok(StatusCode::ACCEPTED)
}

async fn destroy_instance(
    State(world): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut w = world.lock().unwrap();
    w.record(format!("DELETE instances/{id}"), &headers);
    if w.live.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("no instance {id}")))
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn list_applications(
    State(world): State<Shared>,
    Path(org): Path<String>,
    headers: HeaderMap,
) -> Reply {
    let mut w = world.lock().unwrap();
    w.record(format!("GET organizations/{org}/applications"), &headers);
    if !World::authorized(&headers) {
        return Err(denied());
    }
    let apps: Vec<Value> =
        w.applications.iter().map(|(id, name)| json!({ "id": id, "name": name })).collect();
    Ok(Json(Value::Array(apps)))
}

async fn create_application(
    State(world): State<Shared>,
    Path(org): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut w = world.lock().unwrap();
    w.record(format!("POST organizations/{org}/applications"), &headers);
    if w.fail_upload {
        return Err((StatusCode::BAD_REQUEST, "manifest rejected".to_string()));
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let manifest = body["manifest"].as_str().unwrap_or_default().to_string();
    let id = w.next_id("app");
    w.applications.push((id.clone(), name));
    w.manifests.push((id.clone(), content_type(&headers), manifest));
    Ok(Json(json!({ "id": id })))
}

async fn update_manifest(
    State(world): State<Shared>,
    Path(app): Path<String>,
    headers: HeaderMap,
    manifest: String,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut w = world.lock().unwrap();
    w.record(format!("PUT applications/{app}/manifest"), &headers);
    if w.fail_upload {
        return Err((StatusCode::BAD_REQUEST, "manifest rejected".to_string()));
    }
    if !w.applications.iter().any(|(id, _)| *id == app) {
        return Err((StatusCode::NOT_FOUND, format!("no application {app}")));
    }
    w.manifests.push((app, content_type(&headers), manifest));
    Ok(StatusCode::OK)
}

async fn petclinic(State(world): State<Shared>) -> (StatusCode, String) {
    let (status, page, delay) = {
        let mut w = world.lock().unwrap();
        let status =
            StatusCode::from_u16(w.site_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut marker = WELCOME_MARKER;
        if w.branch() == UPDATED_BRANCH {
            if w.stale_left > 0 {
                w.stale_left -= 1;
            } else {
                marker = UPDATED_MARKER;
            }
        }
        let page = match w.site_body {
            Some(body) => body.to_string(),
            None => format!("<html><title>{marker}</title></html>"),
        };
        (status, page, w.site_delay)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (status, page)
}

fn router(world: Shared) -> Router {
    Router::new()
        .route("/api/1/organizations/{org}/environments", post(create_environment))
        .route("/api/1/environments/{id}", axum::routing::delete(destroy_environment))
        .route(
            "/api/1/organizations/{org}/applications",
            get(list_applications).post(create_application),
        )
        .route("/api/1/applications/{app}/manifest", put(update_manifest))
        .route("/api/1/applications/{app}/launch", post(launch))
        .route("/api/1/instances/{id}", get(instance).delete(destroy_instance))
        .route("/api/1/instances/{id}/reconfigure", put(reconfigure))
        .route("/petclinic/", get(petclinic))
        .with_state(world)
}

/// Handle to a running fake. The server thread lives until the test process exits.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    pub base: String,
    pub port: u16,
    world: Shared,
}

impl FakePlatform {
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    pub fn start_with(configure: impl FnOnce(&mut World)) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut world = World::new(port);
        configure(&mut world);
        let base = world.base.clone();
        let world = Arc::new(Mutex::new(world));
        let app = router(world.clone());

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self { base, port, world }
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    pub fn client(&self) -> PlatformClient {
        PlatformClient::connect(&self.base, USER, PASSWORD, Duration::from_secs(5), false).unwrap()
    }

    pub fn client_with_password(&self, password: &str) -> PlatformClient {
        PlatformClient::connect(&self.base, USER, password, Duration::from_secs(5), false).unwrap()
    }

    /// Requests seen so far, as `"METHOD path"` relative to `/api/1/`.
    pub fn requests(&self) -> Vec<String> {
        self.world().requests.clone()
    }
}
