use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    config::ServerConfig,
    error::{RefreshError, Result},
    session::{
        ContentListing, ScheduleListing, ScheduleState, ServerResponse, Session, TaskListing,
    },
};

const AUTH_HEADER: &str = "X-Tableau-Auth";
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct Auth {
    token: String,
    site_id: String,
}

pub struct RestClient {
    http: Client,
    config: ServerConfig,
    auth: Option<Auth>,
}

impl RestClient {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            config,
            auth: None,
        })
    }

    pub fn is_signed_in(&self) -> bool {
        self.auth.is_some()
    }

    /// Signs in with the configured personal access token.
    pub async fn sign_in(&mut self) -> Result<()> {
        let body = json!({
            "credentials": {
                "personalAccessTokenName": self.config.token_name,
                "personalAccessTokenSecret": self.config.token_secret,
                "site": { "contentUrl": self.config.site_url },
            }
        });

        let request = self.http.post(self.api_url("auth/signin")).json(&body);
        let response = self.send(request).await?;
        let value = expect_json(response)?;

        let credentials = &value["credentials"];
        let token = credentials["token"].as_str();
        let site_id = credentials["site"]["id"].as_str();
        match (token, site_id) {
            (Some(token), Some(site_id)) => {
                self.auth = Some(Auth {
                    token: token.to_string(),
                    site_id: site_id.to_string(),
                });
                debug!("signed in to site {}", site_id);
                Ok(())
            }
            _ => Err(RefreshError::Remote {
                status: 200,
                body: value.to_string(),
            }),
        }
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        if !self.is_signed_in() {
            return Ok(());
        }

        let request = self.http.post(self.api_url("auth/signout"));
        let response = self.send(request).await?;
        self.auth = None;
        if !is_success(response.status) {
            return Err(RefreshError::Remote {
                status: response.status,
                body: response.body,
            });
        }
        Ok(())
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.config.url, self.config.api_version, path)
    }

    fn site_url(&self, path: &str) -> Result<String> {
        let auth = self.auth.as_ref().ok_or(RefreshError::NotSignedIn)?;
        Ok(self.api_url(&format!("sites/{}/{}", auth.site_id, path)))
    }

    fn metadata_url(&self) -> String {
        format!("{}/api/metadata/graphql", self.config.url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<ServerResponse> {
        let mut request = request.header("Accept", "application/json");
        if let Some(auth) = &self.auth {
            request = request.header(AUTH_HEADER, &auth.token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ServerResponse::new(status, body))
    }

    async fn send_signed(&self, request: RequestBuilder) -> Result<ServerResponse> {
        if self.auth.is_none() {
            return Err(RefreshError::NotSignedIn);
        }
        self.send(request).await
    }

    /// Collects `collection.item` from every page of a paginated listing.
    async fn fetch_pages<T: DeserializeOwned>(
        &self,
        url: &str,
        collection: &str,
        item: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let request = self.http.get(url).query(&[
                ("pageSize", PAGE_SIZE.to_string()),
                ("pageNumber", page.to_string()),
            ]);
            let value = expect_json(self.send_signed(request).await?)?;

            let page_items = take_items(&value, collection, item)?;
            let fetched = page_items.len();
            items.extend(page_items);

            let total = count(&value["pagination"]["totalAvailable"]).unwrap_or(items.len());
            if fetched == 0 || items.len() >= total {
                break;
            }
            page += 1;
        }

        debug!("fetched {} {} from {}", items.len(), collection, url);
        Ok(items)
    }
}

#[derive(serde::Deserialize)]
struct TaskEnvelope {
    #[serde(rename = "extractRefresh")]
    extract_refresh: Option<TaskListing>,
}

#[async_trait]
impl Session for RestClient {
    async fn list_tasks(&self) -> Result<Vec<TaskListing>> {
        let url = self.site_url("tasks/extractRefreshes")?;
        let value = expect_json(self.send_signed(self.http.get(url)).await?)?;
        let envelopes: Vec<TaskEnvelope> = take_items(&value, "tasks", "task")?;
        Ok(envelopes
            .into_iter()
            .filter_map(|e| e.extract_refresh)
            .collect())
    }

    async fn list_workbooks(&self) -> Result<Vec<ContentListing>> {
        let url = self.site_url("workbooks")?;
        self.fetch_pages(&url, "workbooks", "workbook").await
    }

    async fn list_datasources(&self) -> Result<Vec<ContentListing>> {
        let url = self.site_url("datasources")?;
        self.fetch_pages(&url, "datasources", "datasource").await
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleListing>> {
        let url = self.api_url("schedules");
        self.fetch_pages(&url, "schedules", "schedule").await
    }

    async fn delete_task(&self, task_id: &str) -> Result<ServerResponse> {
        let url = self.site_url(&format!("tasks/extractRefreshes/{task_id}"))?;
        self.send_signed(self.http.delete(url)).await
    }

    async fn create_workbook_task(
        &self,
        workbook_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse> {
        let url = self.site_url(&format!("schedules/{schedule_id}/workbooks"))?;
        let body = json!({ "task": { "extractRefresh": { "workbook": { "id": workbook_id } } } });
        self.send_signed(self.http.put(url).json(&body)).await
    }

    async fn create_datasource_task(
        &self,
        datasource_id: &str,
        schedule_id: &str,
    ) -> Result<ServerResponse> {
        let url = self.site_url(&format!("schedules/{schedule_id}/datasources"))?;
        let body =
            json!({ "task": { "extractRefresh": { "datasource": { "id": datasource_id } } } });
        self.send_signed(self.http.put(url).json(&body)).await
    }

    async fn update_schedule_state(
        &self,
        schedule_id: &str,
        state: ScheduleState,
    ) -> Result<ServerResponse> {
        let url = self.api_url(&format!("schedules/{schedule_id}"));
        let body = json!({ "schedule": { "state": state.as_str() } });
        self.send_signed(self.http.put(url).json(&body)).await
    }

    async fn run_metadata_query(&self, query: &str) -> Result<ServerResponse> {
        let body = json!({ "query": query });
        self.send_signed(self.http.post(self.metadata_url()).json(&body))
            .await
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn expect_json(response: ServerResponse) -> Result<Value> {
    if !is_success(response.status) {
        return Err(RefreshError::Remote {
            status: response.status,
            body: response.body,
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

/// Listings wrap their items as `{"workbooks": {"workbook": [...]}}`; an
/// empty listing may drop the inner key entirely.
fn take_items<T: DeserializeOwned>(value: &Value, collection: &str, item: &str) -> Result<Vec<T>> {
    match value.get(collection).and_then(|c| c.get(item)) {
        Some(items) => Ok(serde_json::from_value(items.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Pagination counts arrive as strings.
fn count(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    }
}
