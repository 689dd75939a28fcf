use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Backend features the mock advertises.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    pub version_control: bool,
}

/// One project's stored specs.
#[derive(Clone, Debug, Default)]
pub struct Project {
    pub spiders: BTreeMap<String, Map<String, Value>>,
    pub items: Map<String, Value>,
    pub extractors: Map<String, Value>,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct Backend {
    pub config: MockConfig,
    pub projects: BTreeMap<String, Project>,
}

pub type Db = Arc<RwLock<Backend>>;

/// Write-command envelope.
#[derive(Deserialize)]
pub struct CommandBody {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Deserialize)]
pub struct FetchBody {
    pub spider: String,
    pub request: FetchTarget,
    pub parent_fp: Option<String>,
}

#[derive(Deserialize)]
pub struct FetchTarget {
    pub url: String,
}

type Reply = Result<Response, (StatusCode, String)>;

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let db: Db = Arc::new(RwLock::new(Backend {
        config,
        projects: BTreeMap::new(),
    }));
    Router::new()
        .route("/projects", get(list_projects).post(project_command))
        .route(
            "/projects/{project}/spec/spiders",
            get(list_spiders).post(spider_command),
        )
        .route(
            "/projects/{project}/spec/spiders/{spider}",
            get(get_spider).post(save_spider),
        )
        .route(
            "/projects/{project}/spec/spiders/{spider}/{template}",
            get(get_template).post(save_template),
        )
        .route("/projects/{project}/spec/items", get(get_items).post(save_items))
        .route(
            "/projects/{project}/spec/extractors",
            get(get_extractors).post(save_extractors),
        )
        .route("/projects/{project}/bot/fetch", post(fetch))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}

/// Names may only hold ASCII alphanumerics, `.` and `_`.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

fn ack() -> Reply {
    Ok(StatusCode::OK.into_response())
}

fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

fn not_found(what: &str, name: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{what} {name} not found"))
}

fn arg(args: &[Value], index: usize) -> Result<&str, (StatusCode, String)> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request(format!("missing string argument {index}")))
}

fn named(args: &[Value], index: usize) -> Result<&str, (StatusCode, String)> {
    let name = arg(args, index)?;
    if !valid_name(name) {
        return Err(bad_request(format!("invalid name: {name}")));
    }
    Ok(name)
}

fn project_mut<'a>(backend: &'a mut Backend, project: &str) -> Result<&'a mut Project, (StatusCode, String)> {
    backend
        .projects
        .get_mut(project)
        .ok_or_else(|| not_found("project", project))
}

fn project_ref<'a>(backend: &'a Backend, project: &str) -> Result<&'a Project, (StatusCode, String)> {
    backend.projects.get(project).ok_or_else(|| not_found("project", project))
}

fn templates_mut(spider: &mut Map<String, Value>) -> &mut Vec<Value> {
    let slot = spider
        .entry("templates")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(templates) => templates,
        _ => unreachable!("templates slot was just set to an array"),
    }
}

fn template_name(template: &Value) -> Option<&str> {
    template.get("name").and_then(Value::as_str)
}

// --- projects ---

async fn list_projects(State(db): State<Db>) -> Json<Vec<String>> {
    let backend = db.read().await;
    Json(backend.projects.keys().cloned().collect())
}

async fn project_command(State(db): State<Db>, Json(body): Json<CommandBody>) -> Reply {
    let mut backend = db.write().await;
    let args = &body.args;
    info!(cmd = %body.cmd, "project command");
    match body.cmd.as_str() {
        "create" => {
            let name = named(args, 0)?;
            if backend.projects.contains_key(name) {
                return Err(bad_request(format!("project {name} already exists")));
            }
            backend.projects.insert(name.to_string(), Project::default());
            ack()
        }
        "rm" => {
            let name = arg(args, 0)?;
            backend
                .projects
                .remove(name)
                .ok_or_else(|| not_found("project", name))?;
            ack()
        }
        "mv" => {
            let old = arg(args, 0)?;
            let new = named(args, 1)?;
            if backend.projects.contains_key(new) {
                return Err(bad_request(format!("project {new} already exists")));
            }
            let project = backend
                .projects
                .remove(old)
                .ok_or_else(|| not_found("project", old))?;
            backend.projects.insert(new.to_string(), project);
            ack()
        }
        cmd => {
            if !backend.config.version_control {
                return Err(bad_request(format!("{cmd}: version control is not enabled")));
            }
            version_control(&mut backend, cmd, args)
        }
    }
}

fn version_control(backend: &mut Backend, cmd: &str, args: &[Value]) -> Reply {
    let name = arg(args, 0)?;
    let project = project_mut(backend, name)?;
    match cmd {
        "edit" => {
            let revision = args.get(1).and_then(Value::as_str).unwrap_or("master");
            debug!(project = name, revision, "edit");
            ack()
        }
        "revisions" => Ok(Json(json!(["master"])).into_response()),
        "conflicts" => Ok(Json(json!({})).into_response()),
        "changes" => {
            let changed: Vec<&String> = project.files.keys().collect();
            Ok(Json(json!(changed)).into_response())
        }
        "publish" => {
            project.files.clear();
            ack()
        }
        "deploy" => Ok(Json(json!({"status": "ok", "project": name})).into_response()),
        "discard" => {
            project.files.clear();
            ack()
        }
        "save" => {
            let file = arg(args, 1)?;
            let contents = arg(args, 2)?;
            project.files.insert(file.to_string(), contents.to_string());
            ack()
        }
        other => Err(bad_request(format!("unknown command: {other}"))),
    }
}

// --- spiders and templates ---

async fn list_spiders(State(db): State<Db>, Path(project): Path<String>) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let backend = db.read().await;
    let project = project_ref(&backend, &project)?;
    Ok(Json(project.spiders.keys().cloned().collect()))
}

async fn spider_command(
    State(db): State<Db>,
    Path(project): Path<String>,
    Json(body): Json<CommandBody>,
) -> Reply {
    let mut backend = db.write().await;
    let project = project_mut(&mut backend, &project)?;
    let args = &body.args;
    match body.cmd.as_str() {
        // Spider and template renames overwrite their target.
        "mv" => {
            let old = arg(args, 0)?;
            let new = named(args, 1)?;
            let spider = project.spiders.remove(old).ok_or_else(|| not_found("spider", old))?;
            project.spiders.insert(new.to_string(), spider);
            ack()
        }
        "rm" => {
            let name = arg(args, 0)?;
            project.spiders.remove(name).ok_or_else(|| not_found("spider", name))?;
            ack()
        }
        "mvt" => {
            let spider_name = arg(args, 0)?;
            let old = arg(args, 1)?;
            let new = named(args, 2)?;
            let spider = project
                .spiders
                .get_mut(spider_name)
                .ok_or_else(|| not_found("spider", spider_name))?;
            let templates = templates_mut(spider);
            let index = templates
                .iter()
                .position(|t| template_name(t) == Some(old))
                .ok_or_else(|| not_found("template", old))?;
            let mut template = templates.remove(index);
            templates.retain(|t| template_name(t) != Some(new));
            if let Value::Object(fields) = &mut template {
                fields.insert("name".to_string(), json!(new));
            }
            templates.push(template);
            ack()
        }
        "rmt" => {
            let spider_name = arg(args, 0)?;
            let name = arg(args, 1)?;
            let spider = project
                .spiders
                .get_mut(spider_name)
                .ok_or_else(|| not_found("spider", spider_name))?;
            let templates = templates_mut(spider);
            let before = templates.len();
            templates.retain(|t| template_name(t) != Some(name));
            if templates.len() == before {
                return Err(not_found("template", name));
            }
            ack()
        }
        other => Err(bad_request(format!("unknown command: {other}"))),
    }
}

async fn get_spider(
    State(db): State<Db>,
    Path((project, spider)): Path<(String, String)>,
) -> Result<Json<Map<String, Value>>, (StatusCode, String)> {
    let backend = db.read().await;
    let project = project_ref(&backend, &project)?;
    project
        .spiders
        .get(&spider)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("spider", &spider))
}

async fn save_spider(
    State(db): State<Db>,
    Path((project, spider)): Path<(String, String)>,
    Json(mut body): Json<Map<String, Value>>,
) -> Reply {
    if !valid_name(&spider) {
        return Err(bad_request(format!("invalid name: {spider}")));
    }
    let mut backend = db.write().await;
    let project = project_mut(&mut backend, &project)?;
    let stored = project.spiders.get(&spider).and_then(|s| s.get("templates"));
    // A body without templates only updates the spider's settings.
    match body.get_mut("templates") {
        Some(incoming) => keep_original_bodies(stored, incoming),
        None => {
            let existing = stored.cloned().unwrap_or_else(|| Value::Array(Vec::new()));
            body.insert("templates".to_string(), existing);
        }
    }
    body.remove("name");
    project.spiders.insert(spider, body);
    ack()
}

/// Carry each stored template's `original_body` over to the incoming
/// template of the same name when the incoming one has none.
fn keep_original_bodies(stored: Option<&Value>, incoming: &mut Value) {
    let (Some(stored), Some(incoming)) = (stored.and_then(Value::as_array), incoming.as_array_mut()) else {
        return;
    };
    for template in incoming.iter_mut() {
        let Some(name) = template_name(template).map(str::to_string) else {
            continue;
        };
        let original = stored
            .iter()
            .find(|t| template_name(t) == Some(name.as_str()))
            .and_then(|t| t.get("original_body"));
        if let (Some(original), Value::Object(fields)) = (original, template) {
            fields
                .entry("original_body")
                .or_insert_with(|| original.clone());
        }
    }
}

async fn get_template(
    State(db): State<Db>,
    Path((project, spider, template)): Path<(String, String, String)>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let backend = db.read().await;
    let project = project_ref(&backend, &project)?;
    let spider = project.spiders.get(&spider).ok_or_else(|| not_found("spider", &spider))?;
    spider
        .get("templates")
        .and_then(Value::as_array)
        .and_then(|templates| templates.iter().find(|t| template_name(t) == Some(template.as_str())))
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("template", &template))
}

async fn save_template(
    State(db): State<Db>,
    Path((project, spider, template)): Path<(String, String, String)>,
    Json(mut body): Json<Map<String, Value>>,
) -> Reply {
    if !valid_name(&template) {
        return Err(bad_request(format!("invalid name: {template}")));
    }
    let mut backend = db.write().await;
    let project = project_mut(&mut backend, &project)?;
    let spider = project
        .spiders
        .get_mut(&spider)
        .ok_or_else(|| not_found("spider", &spider))?;
    body.insert("name".to_string(), json!(template));
    let templates = templates_mut(spider);
    match templates.iter_mut().find(|t| template_name(t) == Some(template.as_str())) {
        Some(slot) => {
            // `original_body` is only sent once; keep the stored snapshot.
            if let Some(original) = slot.get("original_body").cloned() {
                body.entry("original_body").or_insert(original);
            }
            *slot = Value::Object(body);
        }
        None => templates.push(Value::Object(body)),
    }
    ack()
}

// --- items and extractors ---

async fn get_items(State(db): State<Db>, Path(project): Path<String>) -> Result<Json<Map<String, Value>>, (StatusCode, String)> {
    let backend = db.read().await;
    Ok(Json(project_ref(&backend, &project)?.items.clone()))
}

async fn save_items(
    State(db): State<Db>,
    Path(project): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Reply {
    check_map_form(&body)?;
    let mut backend = db.write().await;
    project_mut(&mut backend, &project)?.items = body;
    ack()
}

async fn get_extractors(
    State(db): State<Db>,
    Path(project): Path<String>,
) -> Result<Json<Map<String, Value>>, (StatusCode, String)> {
    let backend = db.read().await;
    Ok(Json(project_ref(&backend, &project)?.extractors.clone()))
}

async fn save_extractors(
    State(db): State<Db>,
    Path(project): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Reply {
    check_map_form(&body)?;
    let mut backend = db.write().await;
    project_mut(&mut backend, &project)?.extractors = body;
    ack()
}

/// Collections are stored keyed by name; entries must be objects without
/// their own `name`.
fn check_map_form(body: &Map<String, Value>) -> Result<(), (StatusCode, String)> {
    for (name, entry) in body {
        match entry {
            Value::Object(fields) if !fields.contains_key("name") => {}
            _ => return Err(bad_request(format!("entry {name} is not in map form"))),
        }
    }
    Ok(())
}

// --- bot ---

async fn fetch(
    State(db): State<Db>,
    Path(project): Path<String>,
    Json(body): Json<FetchBody>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let backend = db.read().await;
    let project = project_ref(&backend, &project)?;
    if !project.spiders.contains_key(&body.spider) {
        return Ok(Json(json!({ "error": format!("spider {} not found", body.spider) })));
    }
    debug!(url = %body.request.url, parent_fp = ?body.parent_fp, "fetch");
    Ok(Json(json!({
        "page": format!("<html><body>{}</body></html>", body.request.url),
        "response": {"status": 200, "headers": {}},
        "items": [],
        "fp": Uuid::new_v4().simple().to_string(),
        "error": null,
        "links": [],
        "parent_fp": body.parent_fp,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(valid_name("shop_v2.1"));
        assert!(!valid_name(""));
        assert!(!valid_name("my shop"));
        assert!(!valid_name("a/b"));
    }

    #[test]
    fn command_body_defaults_args() {
        let body: CommandBody = serde_json::from_str(r#"{"cmd":"revisions"}"#).unwrap();
        assert_eq!(body.cmd, "revisions");
        assert!(body.args.is_empty());
    }

    #[test]
    fn command_body_rejects_missing_cmd() {
        let result: Result<CommandBody, _> = serde_json::from_str(r#"{"args":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn fetch_body_parent_fp_optional() {
        let body: FetchBody =
            serde_json::from_str(r#"{"spider":"s","request":{"url":"http://a"}}"#).unwrap();
        assert_eq!(body.request.url, "http://a");
        assert!(body.parent_fp.is_none());
    }

    #[test]
    fn spider_save_keeps_original_bodies() {
        let stored = json!([
            {"name": "t1", "original_body": "<p>one</p>"},
            {"name": "t2", "original_body": "<p>two</p>"}
        ]);
        let mut incoming = json!([
            {"name": "t1", "url": "http://a"},
            {"name": "t2", "original_body": "<p>new</p>"},
            {"name": "t3"}
        ]);
        keep_original_bodies(Some(&stored), &mut incoming);
        assert_eq!(incoming[0]["original_body"], "<p>one</p>");
        assert_eq!(incoming[1]["original_body"], "<p>new</p>");
        assert!(incoming[2].get("original_body").is_none());
    }

    #[test]
    fn templates_slot_is_created() {
        let mut spider = Map::new();
        templates_mut(&mut spider).push(json!({"name": "t"}));
        assert_eq!(spider["templates"], json!([{"name": "t"}]));
    }

    #[test]
    fn map_form_check() {
        let ok: Map<String, Value> = serde_json::from_str(r#"{"a":{"x":1}}"#).unwrap();
        assert!(check_map_form(&ok).is_ok());
        let named: Map<String, Value> = serde_json::from_str(r#"{"a":{"name":"a"}}"#).unwrap();
        assert!(check_map_form(&named).is_err());
        let list_entry: Map<String, Value> = serde_json::from_str(r#"{"a":[1]}"#).unwrap();
        assert!(check_map_form(&list_entry).is_err());
    }
}
