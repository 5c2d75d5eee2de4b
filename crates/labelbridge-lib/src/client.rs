//! Annotation service collaborator.
//!
//! The stages only need a handful of project/task/export calls, expressed by
//! [`AnnotationService`]. [`LabelStudioClient`] implements them against the
//! Label Studio REST API with a blocking `reqwest` client; tests substitute
//! an in-memory service.
//!
//! API surface used:
//!
//!   POST  /api/projects/                                   { title, description }
//!   PATCH /api/projects/{id}/                              { label_config }
//!   GET   /api/projects/{id}/
//!   POST  /api/tasks/                                      { project, data }
//!   GET   /api/projects/{id}/export?exportType=JSON
//!   POST  /api/projects/{id}/exports                       { export_type: "JSON" }
//!   GET   /api/projects/{id}/exports/{export_id}/download

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{BridgeError, Result};

/// Project as returned by the service. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label_config: Option<String>,
}

/// Operations the publisher and importer consume.
pub trait AnnotationService {
    fn create_project(&self, title: &str, description: &str) -> Result<Project>;

    fn update_label_config(&self, project_id: u64, label_config: &str) -> Result<Project>;

    /// Create one task whose data payload is `data`. Returns the created task.
    fn create_task(&self, project_id: u64, data: &Value) -> Result<Value>;

    fn get_project(&self, project_id: u64) -> Result<Project>;

    /// Direct JSON export of every task with its annotations.
    fn export_direct(&self, project_id: u64) -> Result<Value>;

    /// Create an export job; returns its id when the service reports one.
    fn create_export_job(&self, project_id: u64) -> Result<Option<u64>>;

    fn download_export(&self, project_id: u64, export_id: u64) -> Result<Value>;
}

/// Retrieve the project export.
///
/// Tries the direct endpoint first. If that fails for any reason, makes
/// exactly one fallback attempt: create an export job, read its id, and
/// download it. Returns `None` when both paths fail; no retries.
pub fn fetch_export<S: AnnotationService + ?Sized>(service: &S, project_id: u64) -> Option<Value> {
    match service.export_direct(project_id) {
        Ok(data) => {
            info!(project_id, "export retrieved from direct endpoint");
            return Some(data);
        }
        Err(err) => warn!(project_id, %err, "direct export failed; creating export job"),
    }

    let export_id = match service.create_export_job(project_id) {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(project_id, "export job response carried no id");
            return None;
        }
        Err(err) => {
            warn!(project_id, %err, "export job creation failed");
            return None;
        }
    };
    debug!(project_id, export_id, "downloading export job");

    match service.download_export(project_id, export_id) {
        Ok(data) => {
            info!(project_id, export_id, "export retrieved from export job");
            Some(data)
        }
        Err(err) => {
            warn!(project_id, export_id, %err, "export download failed");
            None
        }
    }
}

/// Blocking Label Studio REST client authenticated with `Token <api_key>`.
pub struct LabelStudioClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl LabelStudioClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, format!("Token {}", self.api_key))
    }

    fn send(&self, req: RequestBuilder) -> Result<Value> {
        let resp = self.authed(req).send()?;
        json_response(resp)
    }
}

fn json_response(resp: Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(BridgeError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json::<Value>()?)
}

impl AnnotationService for LabelStudioClient {
    fn create_project(&self, title: &str, description: &str) -> Result<Project> {
        let req = self
            .http
            .post(self.url("/api/projects/"))
            .json(&json!({ "title": title, "description": description }));
        Ok(serde_json::from_value(self.send(req)?)?)
    }

    fn update_label_config(&self, project_id: u64, label_config: &str) -> Result<Project> {
        let req = self
            .http
            .patch(self.url(&format!("/api/projects/{project_id}/")))
            .json(&json!({ "label_config": label_config }));
        Ok(serde_json::from_value(self.send(req)?)?)
    }

    fn create_task(&self, project_id: u64, data: &Value) -> Result<Value> {
        let req = self
            .http
            .post(self.url("/api/tasks/"))
            .json(&json!({ "project": project_id, "data": data }));
        self.send(req)
    }

    fn get_project(&self, project_id: u64) -> Result<Project> {
        let req = self.http.get(self.url(&format!("/api/projects/{project_id}/")));
        Ok(serde_json::from_value(self.send(req)?)?)
    }

    fn export_direct(&self, project_id: u64) -> Result<Value> {
        let req = self
            .http
            .get(self.url(&format!("/api/projects/{project_id}/export")))
            .query(&[("exportType", "JSON")]);
        self.send(req)
    }

    fn create_export_job(&self, project_id: u64) -> Result<Option<u64>> {
        let req = self
            .http
            .post(self.url(&format!("/api/projects/{project_id}/exports")))
            .json(&json!({ "export_type": "JSON" }));
        let job = self.send(req)?;
        Ok(job.get("id").and_then(Value::as_u64))
    }

    fn download_export(&self, project_id: u64, export_id: u64) -> Result<Value> {
        let req = self.http.get(self.url(&format!(
            "/api/projects/{project_id}/exports/{export_id}/download"
        )));
        self.send(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records calls and fails the endpoints it is told to fail.
    #[derive(Default)]
    struct ScriptedExports {
        direct: Option<Value>,
        job_id: Option<u64>,
        job_fails: bool,
        download: Option<Value>,
        calls: RefCell<Vec<String>>,
    }

    fn api_err() -> BridgeError {
        BridgeError::Api {
            status: 500,
            body: "boom".to_string(),
        }
    }

    impl AnnotationService for ScriptedExports {
        fn create_project(&self, _: &str, _: &str) -> Result<Project> {
            unreachable!()
        }
        fn update_label_config(&self, _: u64, _: &str) -> Result<Project> {
            unreachable!()
        }
        fn create_task(&self, _: u64, _: &Value) -> Result<Value> {
            unreachable!()
        }
        fn get_project(&self, _: u64) -> Result<Project> {
            unreachable!()
        }
        fn export_direct(&self, _: u64) -> Result<Value> {
            self.calls.borrow_mut().push("direct".into());
            self.direct.clone().ok_or_else(api_err)
        }
        fn create_export_job(&self, _: u64) -> Result<Option<u64>> {
            self.calls.borrow_mut().push("job".into());
            if self.job_fails {
                Err(api_err())
            } else {
                Ok(self.job_id)
            }
        }
        fn download_export(&self, _: u64, export_id: u64) -> Result<Value> {
            self.calls.borrow_mut().push(format!("download:{export_id}"));
            self.download.clone().ok_or_else(api_err)
        }
    }

    #[test]
    fn direct_export_skips_fallback() {
        let svc = ScriptedExports {
            direct: Some(json!([])),
            ..Default::default()
        };
        assert_eq!(fetch_export(&svc, 1), Some(json!([])));
        assert_eq!(*svc.calls.borrow(), vec!["direct"]);
    }

    #[test]
    fn falls_back_to_export_job_once() {
        let svc = ScriptedExports {
            job_id: Some(7),
            download: Some(json!([{"id": 1}])),
            ..Default::default()
        };
        assert_eq!(fetch_export(&svc, 1), Some(json!([{"id": 1}])));
        assert_eq!(*svc.calls.borrow(), vec!["direct", "job", "download:7"]);
    }

    #[test]
    fn both_paths_failing_yields_none() {
        let svc = ScriptedExports {
            job_id: Some(3),
            ..Default::default()
        };
        assert_eq!(fetch_export(&svc, 1), None);
        assert_eq!(*svc.calls.borrow(), vec!["direct", "job", "download:3"]);

        let no_id = ScriptedExports::default();
        assert_eq!(fetch_export(&no_id, 1), None);
        assert_eq!(*no_id.calls.borrow(), vec!["direct", "job"]);

        let job_fails = ScriptedExports {
            job_fails: true,
            ..Default::default()
        };
        assert_eq!(fetch_export(&job_fails, 1), None);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = LabelStudioClient::new(&ServiceConfig {
            base_url: "http://localhost:8080/".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 0,
        })
        .unwrap();
        assert_eq!(client.url("/api/tasks/"), "http://localhost:8080/api/tasks/");
    }
}
