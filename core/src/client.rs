//! Stateless HTTP request builder and response parser for the slyd API.
//!
//! # Design
//! `SlydClient` holds only its `ClientConfig` and carries no mutable state
//! between calls. Each backend operation is split into a `build_*` method
//! that produces an `HttpRequest` and a `parse_*` method that consumes the
//! `HttpResponse`. `SlydApi` drives the pair through a `Transport`; any other
//! host can do the same.
//!
//! Project-level and version-control operations post a command envelope
//! (`{"cmd": ..., "args": [...]}`) to the API root. Spider, template, item
//! and extractor saves post the resource itself. Items and extractors travel
//! in map form and are converted with the codec on the way in and out.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::codec::{self, Record};
use crate::config::ClientConfig;
use crate::error::{ApiError, HttpError};
use crate::http::{HttpRequest, HttpResponse};
use crate::types::{short_guid, Extractor, FetchedDocument, Item, Spider, Template};

/// Revision checked out by `edit` when the caller does not name one.
pub const DEFAULT_REVISION: &str = "master";

/// Commands accepted by the write-command envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Create,
    Rm,
    Mv,
    Mvt,
    Rmt,
    Edit,
    Revisions,
    Conflicts,
    Changes,
    Publish,
    Deploy,
    Discard,
    Save,
}

#[derive(Serialize)]
struct CommandEnvelope {
    cmd: Command,
    args: Vec<Value>,
}

#[derive(Serialize)]
struct FetchRequest<'a> {
    spider: &'a str,
    request: FetchTarget<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_fp: Option<&'a str>,
}

#[derive(Serialize)]
struct FetchTarget<'a> {
    url: &'a str,
}

/// Synchronous, stateless client for the slyd API.
#[derive(Debug, Clone)]
pub struct SlydClient {
    config: ClientConfig,
}

impl SlydClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn spec_url(&self, project: &str) -> String {
        format!("{}/{project}/spec/", self.config.api_root())
    }

    fn bot_url(&self, project: &str) -> String {
        format!("{}/{project}/bot/", self.config.api_root())
    }

    fn command(&self, url: String, cmd: Command, args: Vec<Value>) -> HttpRequest {
        let envelope = CommandEnvelope { cmd, args };
        // A command envelope holds only strings and booleans.
        let body = json!(envelope).to_string();
        HttpRequest::post_json(url, body)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub fn build_list_projects(&self) -> HttpRequest {
        HttpRequest::get(self.config.api_root())
    }

    pub fn build_create_project(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Create, vec![json!(project)])
    }

    pub fn build_delete_project(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Rm, vec![json!(project)])
    }

    /// Rename a project. The backend refuses to overwrite an existing one.
    pub fn build_rename_project(&self, old_name: &str, new_name: &str) -> HttpRequest {
        self.command(
            self.config.api_root(),
            Command::Mv,
            vec![json!(old_name), json!(new_name)],
        )
    }

    // -----------------------------------------------------------------------
    // Spiders and templates
    // -----------------------------------------------------------------------

    pub fn build_list_spiders(&self, project: &str) -> HttpRequest {
        HttpRequest::get(format!("{}spiders", self.spec_url(project)))
    }

    pub fn build_load_spider(&self, project: &str, spider: &str) -> HttpRequest {
        HttpRequest::get(format!("{}spiders/{spider}", self.spec_url(project)))
    }

    pub fn build_load_template(&self, project: &str, spider: &str, template: &str) -> HttpRequest {
        HttpRequest::get(format!("{}spiders/{spider}/{template}", self.spec_url(project)))
    }

    /// Rename a spider. The backend overwrites an existing spider of the new
    /// name.
    pub fn build_rename_spider(&self, project: &str, old_name: &str, new_name: &str) -> HttpRequest {
        self.command(
            format!("{}spiders", self.spec_url(project)),
            Command::Mv,
            vec![json!(old_name), json!(new_name)],
        )
    }

    /// Rename a template. The backend overwrites an existing template of the
    /// new name.
    pub fn build_rename_template(
        &self,
        project: &str,
        spider: &str,
        old_name: &str,
        new_name: &str,
    ) -> HttpRequest {
        self.command(
            format!("{}spiders", self.spec_url(project)),
            Command::Mvt,
            vec![json!(spider), json!(old_name), json!(new_name)],
        )
    }

    pub fn build_delete_spider(&self, project: &str, spider: &str) -> HttpRequest {
        self.command(
            format!("{}spiders", self.spec_url(project)),
            Command::Rm,
            vec![json!(spider)],
        )
    }

    pub fn build_delete_template(&self, project: &str, spider: &str, template: &str) -> HttpRequest {
        self.command(
            format!("{}spiders", self.spec_url(project)),
            Command::Rmt,
            vec![json!(spider), json!(template)],
        )
    }

    /// Save a spider. With `exclude_templates` the `templates` key is left out
    /// of the body so only the spider's own settings are written.
    pub fn build_save_spider(
        &self,
        project: &str,
        spider: &Spider,
        exclude_templates: bool,
    ) -> Result<HttpRequest, ApiError> {
        let mut serialized = to_object(spider)?;
        if exclude_templates {
            serialized.shift_remove("templates");
        }
        Ok(HttpRequest::post_json(
            format!("{}spiders/{}", self.spec_url(project), spider.name),
            Value::Object(serialized).to_string(),
        ))
    }

    /// Save a template. The first save of a new template also sends its
    /// `original_body` and clears `is_new`.
    pub fn build_save_template(
        &self,
        project: &str,
        spider: &str,
        template: &mut Template,
    ) -> Result<HttpRequest, ApiError> {
        let mut serialized = to_object(&*template)?;
        if template.is_new {
            let original = template.original_body.clone().map_or(Value::Null, Value::String);
            serialized.insert("original_body".to_string(), original);
            template.is_new = false;
        }
        Ok(HttpRequest::post_json(
            format!("{}spiders/{spider}/{}", self.spec_url(project), template.name),
            Value::Object(serialized).to_string(),
        ))
    }

    // -----------------------------------------------------------------------
    // Items and extractors
    // -----------------------------------------------------------------------

    pub fn build_load_items(&self, project: &str) -> HttpRequest {
        HttpRequest::get(format!("{}items", self.spec_url(project)))
    }

    pub fn build_save_items(&self, project: &str, items: &[Item]) -> Result<HttpRequest, ApiError> {
        let records = items
            .iter()
            .map(|item| -> Result<Record, ApiError> {
                let mut record = to_object(item)?;
                if let Some(Value::Array(fields)) = record.get("fields") {
                    let fields = fields
                        .iter()
                        .enumerate()
                        .map(|(index, field)| match field {
                            Value::Object(field) => Ok(field.clone()),
                            _ => Err(codec::CodecError::NotARecord { index }),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let fields = codec::to_map(&fields)?;
                    record.insert("fields".to_string(), Value::Object(fields));
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let body = codec::to_map(&records)?;
        Ok(HttpRequest::post_json(
            format!("{}items", self.spec_url(project)),
            Value::Object(body).to_string(),
        ))
    }

    pub fn build_load_extractors(&self, project: &str) -> HttpRequest {
        HttpRequest::get(format!("{}extractors", self.spec_url(project)))
    }

    pub fn build_save_extractors(
        &self,
        project: &str,
        extractors: &[Extractor],
    ) -> Result<HttpRequest, ApiError> {
        let body = codec::to_map_from(extractors)?;
        Ok(HttpRequest::post_json(
            format!("{}extractors", self.spec_url(project)),
            Value::Object(body).to_string(),
        ))
    }

    // -----------------------------------------------------------------------
    // Version control
    // -----------------------------------------------------------------------

    /// Check out `revision` (default `master`) for editing. Returns `None`
    /// when the backend has no version control: there is nothing to send.
    pub fn build_edit_project(&self, project: &str, revision: Option<&str>) -> Option<HttpRequest> {
        if !self.config.capabilities.version_control {
            return None;
        }
        let revision = revision.unwrap_or(DEFAULT_REVISION);
        Some(self.command(
            self.config.api_root(),
            Command::Edit,
            vec![json!(project), json!(revision)],
        ))
    }

    pub fn build_project_revisions(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Revisions, vec![json!(project)])
    }

    pub fn build_conflicted_files(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Conflicts, vec![json!(project)])
    }

    pub fn build_changed_files(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Changes, vec![json!(project)])
    }

    pub fn build_publish_project(&self, project: &str, force: bool) -> HttpRequest {
        self.command(
            self.config.api_root(),
            Command::Publish,
            vec![json!(project), json!(force)],
        )
    }

    pub fn build_deploy_project(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Deploy, vec![json!(project)])
    }

    pub fn build_discard_changes(&self, project: &str) -> HttpRequest {
        self.command(self.config.api_root(), Command::Discard, vec![json!(project)])
    }

    /// Write a raw project file.
    pub fn build_save_file(&self, project: &str, file_name: &str, contents: &str) -> HttpRequest {
        self.command(
            self.config.api_root(),
            Command::Save,
            vec![json!(project), json!(file_name), json!(contents)],
        )
    }

    // -----------------------------------------------------------------------
    // Bot
    // -----------------------------------------------------------------------

    /// Fetch `page_url` through `spider`. `parent_fp` is the fingerprint of the
    /// page the link was followed from.
    pub fn build_fetch_document(
        &self,
        project: &str,
        page_url: &str,
        spider: &str,
        parent_fp: Option<&str>,
    ) -> Result<HttpRequest, ApiError> {
        let body = FetchRequest {
            spider,
            request: FetchTarget { url: page_url },
            parent_fp,
        };
        let body = serde_json::to_string(&body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest::post_json(format!("{}fetch", self.bot_url(project)), body))
    }

    // -----------------------------------------------------------------------
    // Parsers
    // -----------------------------------------------------------------------

    /// Parse a text acknowledgement. The body, if any, is ignored.
    pub fn parse_ack(&self, request: &HttpRequest, response: HttpResponse) -> Result<(), ApiError> {
        check_status(request, &response)?;
        Ok(())
    }

    /// Parse a JSON body into `T`.
    pub fn parse_json<T: DeserializeOwned>(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Result<T, ApiError> {
        check_status(request, &response)?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn parse_names(&self, request: &HttpRequest, response: HttpResponse) -> Result<Vec<String>, ApiError> {
        self.parse_json(request, response)
    }

    /// Parse a spider document. The spider takes `spider_name`, and templates
    /// stored without a name get a generated one.
    pub fn parse_load_spider(
        &self,
        spider_name: &str,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Result<Spider, ApiError> {
        let mut spider: Spider = self.parse_json(request, response)?;
        spider.name = spider_name.to_string();
        for template in &mut spider.templates {
            if template.name.is_empty() {
                template.name = short_guid();
            }
        }
        Ok(spider)
    }

    pub fn parse_load_template(&self, request: &HttpRequest, response: HttpResponse) -> Result<Template, ApiError> {
        self.parse_json(request, response)
    }

    /// Parse the items map, converting both the items and each item's
    /// `fields` back to list form.
    pub fn parse_load_items(&self, request: &HttpRequest, response: HttpResponse) -> Result<Vec<Item>, ApiError> {
        let map: Record = self.parse_json(request, response)?;
        let mut records = codec::to_list(&map)?;
        for record in &mut records {
            if let Some(Value::Object(fields)) = record.get("fields") {
                let fields = codec::to_list(fields)?;
                record.insert(
                    "fields".to_string(),
                    Value::Array(fields.into_iter().map(Value::Object).collect()),
                );
            }
        }
        records
            .into_iter()
            .map(|record| {
                serde_json::from_value(Value::Object(record)).map_err(|e| ApiError::Deserialization(e.to_string()))
            })
            .collect()
    }

    pub fn parse_load_extractors(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Result<Vec<Extractor>, ApiError> {
        let map: Record = self.parse_json(request, response)?;
        Ok(codec::to_list_as(&map)?)
    }

    pub fn parse_fetch_document(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Result<FetchedDocument, ApiError> {
        self.parse_json(request, response)
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Record, ApiError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::Serialization(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(ApiError::Serialization(e.to_string())),
    }
}

/// Map a non-2xx response to `ApiError::Http`.
fn check_status(request: &HttpRequest, response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Http(HttpError::from_response(request, response)))
}
