/*!
Stub cloud OpenStack pour tests sans infrastructure

Sert en local (port éphémère) le strict nécessaire des APIs:
- Keystone v3: émission de token + catalogue de services, liste des projets
- Nova v2.1: hyperviseurs, flavors, serveurs
- Cinder v3: volumes, pools du scheduler

Toutes les routes de liste exigent le header `X-Auth-Token`. Les requêtes
reçues sont journalisées pour les assertions de tests.
*/

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Token émis par le stub
pub const TOKEN: &str = "devkit-token";

/// Id du projet de scope, présent dans l'URL Cinder du catalogue
pub const PROJECT_ID: &str = "admin-project-id";

/// Ressources listables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Projects,
    Hypervisors,
    Flavors,
    Servers,
    Volumes,
    StoragePools,
}

impl Resource {
    fn key(self) -> &'static str {
        match self {
            Resource::Projects => "projects",
            Resource::Hypervisors => "hypervisors",
            Resource::Flavors => "flavors",
            Resource::Servers => "servers",
            Resource::Volumes => "volumes",
            Resource::StoragePools => "pools",
        }
    }
}

/// Panne injectée sur une ressource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Répond avec ce code HTTP
    Status(u16),
    /// Répond 200 avec un corps JSON tronqué
    Garbled,
}

/// Contenu du cloud simulé
#[derive(Debug, Clone)]
pub struct CloudFixtures {
    pub username: String,
    pub password: String,
    pub project: String,
    pub domain: String,
    pub projects: Vec<Value>,
    pub hypervisors: Vec<Value>,
    pub flavors: Vec<Value>,
    pub servers: Vec<Value>,
    pub volumes: Vec<Value>,
    pub pools: Vec<Value>,
    /// Taille de page pour Keystone/Nova/Cinder (None = tout d'un coup)
    pub page_size: Option<usize>,
    faults: HashMap<Resource, Fault>,
    missing_services: HashSet<String>,
}

impl Default for CloudFixtures {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "Passw0rd".to_string(),
            project: "admin".to_string(),
            domain: "default".to_string(),
            projects: Vec::new(),
            hypervisors: Vec::new(),
            flavors: Vec::new(),
            servers: Vec::new(),
            volumes: Vec::new(),
            pools: Vec::new(),
            page_size: None,
            faults: HashMap::new(),
            missing_services: HashSet::new(),
        }
    }
}

impl CloudFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projects(mut self, projects: Vec<Value>) -> Self {
        self.projects = projects;
        self
    }

    pub fn hypervisors(mut self, hypervisors: Vec<Value>) -> Self {
        self.hypervisors = hypervisors;
        self
    }

    pub fn flavors(mut self, flavors: Vec<Value>) -> Self {
        self.flavors = flavors;
        self
    }

    pub fn servers(mut self, servers: Vec<Value>) -> Self {
        self.servers = servers;
        self
    }

    pub fn volumes(mut self, volumes: Vec<Value>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn pools(mut self, pools: Vec<Value>) -> Self {
        self.pools = pools;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Injecte une panne sur une ressource
    pub fn fault(mut self, resource: Resource, fault: Fault) -> Self {
        self.faults.insert(resource, fault);
        self
    }

    /// Retire un type de service du catalogue (ex: "volumev3")
    pub fn without_service(mut self, service_type: &str) -> Self {
        self.missing_services.insert(service_type.to_string());
        self
    }

    fn items(&self, resource: Resource) -> &[Value] {
        match resource {
            Resource::Projects => &self.projects,
            Resource::Hypervisors => &self.hypervisors,
            Resource::Flavors => &self.flavors,
            Resource::Servers => &self.servers,
            Resource::Volumes => &self.volumes,
            Resource::StoragePools => &self.pools,
        }
    }
}

#[derive(Clone)]
struct StubState {
    fixtures: Arc<CloudFixtures>,
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubState {
    fn catalog(&self) -> Vec<Value> {
        let base = &self.base_url;
        [
            ("identity", format!("{base}/identity/v3")),
            ("compute", format!("{base}/compute/v2.1")),
            ("volumev3", format!("{base}/volume/v3/{PROJECT_ID}")),
        ]
        .into_iter()
        .filter(|(service_type, _)| !self.fixtures.missing_services.contains(*service_type))
        .map(|(service_type, url)| {
            json!({
                "type": service_type,
                "name": service_type,
                "endpoints": [
                    {"interface": "internal", "region": "RegionOne", "region_id": "RegionOne",
                     "url": url},
                    {"interface": "public", "region": "RegionOne", "region_id": "RegionOne",
                     "url": url}
                ]
            })
        })
        .collect()
    }
}

/// Cloud OpenStack simulé, arrêté au drop
pub struct StubCloud {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl StubCloud {
    /// Démarre le stub sur 127.0.0.1, port éphémère
    pub async fn start(fixtures: CloudFixtures) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = StubState {
            fixtures: Arc::new(fixtures),
            base_url: base_url.clone(),
            requests: requests.clone(),
        };

        let app = router(state);
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("stub cloud stopped: {}", e);
            }
        });

        tracing::debug!("stub cloud listening on {}", base_url);
        Ok(Self {
            base_url,
            requests,
            server,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint Keystone à mettre dans la config de l'agent
    pub fn identity_endpoint(&self) -> String {
        format!("{}/identity", self.base_url)
    }

    /// Requêtes reçues, au format "METHOD /path?query"
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Requêtes dont la ligne contient le fragment donné
    pub fn requests_matching(&self, fragment: &str) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|line| line.contains(fragment))
            .cloned()
            .collect()
    }
}

impl Drop for StubCloud {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(state: StubState) -> Router {
    Router::new()
        .route("/identity/v3/auth/tokens", post(issue_token))
        .route("/identity/v3/projects", get(list_projects))
        .route("/compute/v2.1/os-hypervisors/detail", get(list_hypervisors))
        .route("/compute/v2.1/flavors/detail", get(list_flavors))
        .route("/compute/v2.1/servers/detail", get(list_servers))
        .route("/volume/v3/{project_id}/volumes/detail", get(list_volumes))
        .route("/volume/v3/{project_id}/scheduler-stats/get_pools", get(list_pools))
        .with_state(state)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": 401, "title": "Unauthorized",
                              "message": "The request you have made requires authentication."}})),
    )
        .into_response()
}

async fn issue_token(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    state.requests.lock().push("POST /identity/v3/auth/tokens".to_string());

    let fixtures = &state.fixtures;
    let user = &body["auth"]["identity"]["password"]["user"];
    let scope = &body["auth"]["scope"]["project"];

    let accepted = user["name"] == fixtures.username.as_str()
        && user["password"] == fixtures.password.as_str()
        && user["domain"]["name"] == fixtures.domain.as_str()
        && scope["name"] == fixtures.project.as_str();

    if !accepted {
        return unauthorized();
    }

    let token = json!({
        "token": {
            "methods": ["password"],
            "expires_at": "2099-01-01T00:00:00.000000Z",
            "project": {
                "id": PROJECT_ID,
                "name": fixtures.project,
                "domain": {"name": fixtures.domain}
            },
            "user": {"name": fixtures.username},
            "catalog": state.catalog()
        }
    });

    (StatusCode::CREATED, [("X-Subject-Token", TOKEN)], Json(token)).into_response()
}

async fn list_projects(State(state): State<StubState>, headers: HeaderMap, uri: Uri) -> Response {
    list(&state, &headers, &uri, Resource::Projects)
}

async fn list_hypervisors(
    State(state): State<StubState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    list(&state, &headers, &uri, Resource::Hypervisors)
}

async fn list_flavors(State(state): State<StubState>, headers: HeaderMap, uri: Uri) -> Response {
    list(&state, &headers, &uri, Resource::Flavors)
}

async fn list_servers(State(state): State<StubState>, headers: HeaderMap, uri: Uri) -> Response {
    list(&state, &headers, &uri, Resource::Servers)
}

async fn list_volumes(State(state): State<StubState>, headers: HeaderMap, uri: Uri) -> Response {
    list(&state, &headers, &uri, Resource::Volumes)
}

async fn list_pools(State(state): State<StubState>, headers: HeaderMap, uri: Uri) -> Response {
    list(&state, &headers, &uri, Resource::StoragePools)
}

fn list(state: &StubState, headers: &HeaderMap, uri: &Uri, resource: Resource) -> Response {
    state.requests.lock().push(format!("GET {}", uri));

    let authenticated = headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == TOKEN)
        .unwrap_or(false);
    if !authenticated {
        return unauthorized();
    }

    match state.fixtures.faults.get(&resource) {
        Some(Fault::Status(code)) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, "stub fault").into_response();
        }
        Some(Fault::Garbled) => {
            let body = format!("{{\"{}\": [{{\"id\": ", resource.key());
            return (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response();
        }
        None => {}
    }

    let items = state.fixtures.items(resource);
    let key = resource.key();

    // le scheduler Cinder ne pagine pas
    if resource == Resource::StoragePools {
        return Json(json!({ key: items })).into_response();
    }

    let (page, next) = paginate(items, state.fixtures.page_size, uri, &state.base_url);

    let body = if resource == Resource::Projects {
        json!({
            "projects": page,
            "links": {"self": format!("{}{}", state.base_url, uri), "previous": null, "next": next}
        })
    } else {
        let mut body = Map::new();
        body.insert(key.to_string(), Value::Array(page));
        if let Some(next) = next {
            body.insert(format!("{key}_links"), json!([{"rel": "next", "href": next}]));
        }
        Value::Object(body)
    };

    Json(body).into_response()
}

/// Découpe `items` selon `?page=N` et construit le lien suivant
fn paginate(
    items: &[Value],
    page_size: Option<usize>,
    uri: &Uri,
    base_url: &str,
) -> (Vec<Value>, Option<String>) {
    let Some(size) = page_size.filter(|s| *s > 0) else {
        return (items.to_vec(), None);
    };

    let mut page = 0usize;
    let mut query: Vec<String> = Vec::new();
    for pair in uri.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        match pair.strip_prefix("page=") {
            Some(n) => page = n.parse().unwrap_or(0),
            None => query.push(pair.to_string()),
        }
    }

    let start = page * size;
    let chunk: Vec<Value> = items.iter().skip(start).take(size).cloned().collect();

    let next = if start + size < items.len() {
        query.push(format!("page={}", page + 1));
        Some(format!("{}{}?{}", base_url, uri.path(), query.join("&")))
    } else {
        None
    };

    (chunk, next)
}
