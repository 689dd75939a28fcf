//! Asynchronous slyd API over a `Transport`.
//!
//! Every method issues exactly one request and resolves once, with the
//! parsed result or an `ApiError`. `edit_project` is the one exception: when
//! the backend has no version control it resolves without sending anything.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::SlydClient;
use crate::config::ClientConfig;
use crate::error::{ApiError, HttpError};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{Extractor, FetchedDocument, Item, Spider, Template};

#[derive(Debug, Clone)]
pub struct SlydApi<T> {
    client: SlydClient,
    transport: T,
}

impl SlydApi<UreqTransport> {
    pub fn with_ureq(config: ClientConfig) -> Self {
        Self::new(config, UreqTransport::new())
    }
}

impl<T: Transport> SlydApi<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            client: SlydClient::new(config),
            transport,
        }
    }

    pub fn client(&self) -> &SlydClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.path, "dispatching request");
        match self.transport.execute(request).await {
            Ok(response) => {
                if !response.is_success() {
                    warn!(
                        method = %request.method,
                        url = %request.path,
                        status = response.status,
                        "request failed"
                    );
                }
                Ok(response)
            }
            Err(err) => {
                warn!(method = %request.method, url = %request.path, error = %err, "request failed");
                Err(ApiError::Http(HttpError::from_transport(request, &err)))
            }
        }
    }

    async fn ack(&self, request: HttpRequest) -> Result<(), ApiError> {
        let response = self.send(&request).await?;
        self.client.parse_ack(&request, response)
    }

    async fn json<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R, ApiError> {
        let response = self.send(&request).await?;
        self.client.parse_json(&request, response)
    }

    // --- projects ---

    pub async fn list_projects(&self) -> Result<Vec<String>, ApiError> {
        self.json(self.client.build_list_projects()).await
    }

    pub async fn create_project(&self, project: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_create_project(project)).await
    }

    pub async fn delete_project(&self, project: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_delete_project(project)).await
    }

    pub async fn rename_project(&self, old_name: &str, new_name: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_rename_project(old_name, new_name)).await
    }

    // --- spiders and templates ---

    pub async fn list_spiders(&self, project: &str) -> Result<Vec<String>, ApiError> {
        self.json(self.client.build_list_spiders(project)).await
    }

    pub async fn load_spider(&self, project: &str, spider: &str) -> Result<Spider, ApiError> {
        let request = self.client.build_load_spider(project, spider);
        let response = self.send(&request).await?;
        self.client.parse_load_spider(spider, &request, response)
    }

    pub async fn load_template(&self, project: &str, spider: &str, template: &str) -> Result<Template, ApiError> {
        let request = self.client.build_load_template(project, spider, template);
        let response = self.send(&request).await?;
        self.client.parse_load_template(&request, response)
    }

    pub async fn rename_spider(&self, project: &str, old_name: &str, new_name: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_rename_spider(project, old_name, new_name)).await
    }

    pub async fn rename_template(
        &self,
        project: &str,
        spider: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), ApiError> {
        self.ack(self.client.build_rename_template(project, spider, old_name, new_name))
            .await
    }

    pub async fn save_spider(&self, project: &str, spider: &Spider, exclude_templates: bool) -> Result<(), ApiError> {
        self.ack(self.client.build_save_spider(project, spider, exclude_templates)?)
            .await
    }

    pub async fn save_template(&self, project: &str, spider: &str, template: &mut Template) -> Result<(), ApiError> {
        self.ack(self.client.build_save_template(project, spider, template)?).await
    }

    pub async fn delete_spider(&self, project: &str, spider: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_delete_spider(project, spider)).await
    }

    pub async fn delete_template(&self, project: &str, spider: &str, template: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_delete_template(project, spider, template)).await
    }

    // --- items and extractors ---

    pub async fn load_items(&self, project: &str) -> Result<Vec<Item>, ApiError> {
        let request = self.client.build_load_items(project);
        let response = self.send(&request).await?;
        self.client.parse_load_items(&request, response)
    }

    pub async fn save_items(&self, project: &str, items: &[Item]) -> Result<(), ApiError> {
        self.ack(self.client.build_save_items(project, items)?).await
    }

    pub async fn load_extractors(&self, project: &str) -> Result<Vec<Extractor>, ApiError> {
        let request = self.client.build_load_extractors(project);
        let response = self.send(&request).await?;
        self.client.parse_load_extractors(&request, response)
    }

    pub async fn save_extractors(&self, project: &str, extractors: &[Extractor]) -> Result<(), ApiError> {
        self.ack(self.client.build_save_extractors(project, extractors)?).await
    }

    // --- version control ---

    pub async fn edit_project(&self, project: &str, revision: Option<&str>) -> Result<(), ApiError> {
        match self.client.build_edit_project(project, revision) {
            Some(request) => self.ack(request).await,
            None => {
                debug!(project, "version control unavailable, skipping edit");
                Ok(())
            }
        }
    }

    pub async fn project_revisions(&self, project: &str) -> Result<Value, ApiError> {
        self.json(self.client.build_project_revisions(project)).await
    }

    pub async fn conflicted_files(&self, project: &str) -> Result<Value, ApiError> {
        self.json(self.client.build_conflicted_files(project)).await
    }

    pub async fn changed_files(&self, project: &str) -> Result<Value, ApiError> {
        self.json(self.client.build_changed_files(project)).await
    }

    pub async fn publish_project(&self, project: &str, force: bool) -> Result<(), ApiError> {
        self.ack(self.client.build_publish_project(project, force)).await
    }

    pub async fn deploy_project(&self, project: &str) -> Result<Value, ApiError> {
        self.json(self.client.build_deploy_project(project)).await
    }

    pub async fn discard_changes(&self, project: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_discard_changes(project)).await
    }

    pub async fn save_file(&self, project: &str, file_name: &str, contents: &str) -> Result<(), ApiError> {
        self.ack(self.client.build_save_file(project, file_name, contents)).await
    }

    // --- bot ---

    pub async fn fetch_document(
        &self,
        project: &str,
        page_url: &str,
        spider: &str,
        parent_fp: Option<&str>,
    ) -> Result<FetchedDocument, ApiError> {
        let request = self.client.build_fetch_document(project, page_url, spider, parent_fp)?;
        let response = self.send(&request).await?;
        self.client.parse_fetch_document(&request, response)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::config::Capabilities;
    use crate::error::{FailureReason, TransportError};

    /// Records every request and replays canned responses in order.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<HttpRequest>>,
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    }

    impl RecordingTransport {
        fn replying(replies: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
            }
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("no reply queued".to_string())))
        }
    }

    fn reply(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn api(replies: Vec<Result<HttpResponse, TransportError>>) -> SlydApi<RecordingTransport> {
        SlydApi::new(
            ClientConfig::new("http://localhost:9001"),
            RecordingTransport::replying(replies),
        )
    }

    fn sent_body(request: &HttpRequest) -> Value {
        serde_json::from_str(request.body.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn edit_project_without_version_control_sends_nothing() {
        let api = api(Vec::new());
        api.edit_project("shop", None).await.unwrap();
        assert!(api.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn edit_project_with_version_control_sends_one_request() {
        let capabilities = Capabilities {
            version_control: true,
            ..Capabilities::default()
        };
        let api = SlydApi::new(
            ClientConfig::new("http://localhost:9001").with_capabilities(capabilities),
            RecordingTransport::replying(vec![reply(200, "")]),
        );
        api.edit_project("shop", Some("v2")).await.unwrap();
        let sent = api.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent_body(&sent[0]), json!({"cmd": "edit", "args": ["shop", "v2"]}));
    }

    #[tokio::test]
    async fn save_spider_excluding_templates() {
        let api = api(vec![reply(200, "")]);
        let spider = Spider {
            name: "books".to_string(),
            templates: vec![Template::default()],
            ..Spider::default()
        };
        api.save_spider("shop", &spider, true).await.unwrap();
        let sent = api.transport().sent();
        assert_eq!(sent.len(), 1);
        assert!(sent_body(&sent[0]).get("templates").is_none());
    }

    #[tokio::test]
    async fn save_template_twice_sends_original_body_once() {
        let api = api(vec![reply(200, ""), reply(200, "")]);
        let mut template = Template::new_from_page("t1", "http://a", "<html/>");
        api.save_template("shop", "books", &mut template).await.unwrap();
        assert!(!template.is_new);
        api.save_template("shop", "books", &mut template).await.unwrap();

        let sent = api.transport().sent();
        assert_eq!(sent_body(&sent[0])["original_body"], "<html/>");
        assert!(sent_body(&sent[1]).get("original_body").is_none());
    }

    #[tokio::test]
    async fn load_items_returns_list_form() {
        let api = api(vec![reply(
            200,
            r#"{"book":{"fields":{"title":{"type":"text"}}},"author":{"fields":{}}}"#,
        )]);
        let items = api.load_items("shop").await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["book", "author"]);
        assert_eq!(items[0].fields[0].name, "title");
        assert!(items[1].fields.is_empty());
    }

    #[tokio::test]
    async fn http_status_error_carries_request_context() {
        let api = api(vec![reply(500, "traceback")]);
        let err = api.create_project("shop").await.unwrap_err();
        let http = err.as_http().unwrap();
        assert_eq!(http.reason(), FailureReason::Status(500));
        assert!(http.title().contains("with data"));
        assert!(http.message().ends_with("traceback"));
    }

    #[tokio::test]
    async fn transport_error_is_wrapped() {
        let api = api(vec![Err(TransportError("connection refused".to_string()))]);
        let err = api.list_projects().await.unwrap_err();
        let http = err.as_http().unwrap();
        assert!(matches!(http.reason(), FailureReason::Transport(_)));
        assert_eq!(http.status, None);
    }

    #[tokio::test]
    async fn codec_failure_sends_nothing() {
        let api = api(Vec::new());
        let err = api.save_items("shop", &[Item::default()]).await.unwrap_err();
        assert!(matches!(err, ApiError::Codec(_)));
        assert!(api.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn json_operations_return_values() {
        let api = api(vec![reply(200, r#"["master","v1"]"#), reply(200, r#"{"status":"ok"}"#)]);
        assert_eq!(api.project_revisions("shop").await.unwrap(), json!(["master", "v1"]));
        assert_eq!(api.deploy_project("shop").await.unwrap()["status"], "ok");
    }
}
