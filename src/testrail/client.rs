//! reqwest-backed TestRail client.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{ApiMilestone, ApiPlan, ApiResult, ApiRun, PageResponse};
use super::{FetchError, TestRailSource};
use crate::analysis::{Milestone, Observation, PlanSummary, RunMetadata};
use crate::config::TestRailConfig;

#[derive(Debug, Clone)]
pub struct TestRailClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    api_key: String,
    page_size: u32,
}

impl TestRailClient {
    pub fn new(config: &TestRailConfig) -> Result<Self, FetchError> {
        let required = [
            ("url", &config.url),
            ("username", &config.username),
            ("api_key", &config.api_key),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(FetchError::MissingCredentials { field });
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("railreport/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                endpoint: config.url.clone(),
                source: e,
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            page_size: config.page_size(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/index.php?/api/v2/{}", self.base_url, endpoint)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        let url = self.url(endpoint);
        debug!(%endpoint, "GET");
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.api_key))
            .send()
            .await
            .map_err(|e| FetchError::Network {
                endpoint: endpoint.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Network {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Follow `limit`/`offset` while the server reports a next link. Bare
    /// arrays carry no link, so a short page ends them.
    async fn get_paged<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, FetchError> {
        let limit = self.page_size as usize;
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let page: PageResponse<T> = self
                .get(&format!("{}&limit={}&offset={}", endpoint, limit, offset))
                .await?;
            let (batch, more) = page.into_parts();
            let fetched = batch.len();
            items.extend(batch);

            let done = match more {
                Some(next) => !next,
                None => fetched < limit,
            };
            if fetched == 0 || done {
                break;
            }
            offset += fetched;
        }
        debug!(%endpoint, count = items.len(), "paged fetch complete");
        Ok(items)
    }
}

#[async_trait::async_trait]
impl TestRailSource for TestRailClient {
    async fn run_results(&self, run_id: u64) -> Result<Vec<Observation>, FetchError> {
        let results: Vec<ApiResult> = self
            .get_paged(&format!("get_results_for_run/{}", run_id))
            .await?;
        Ok(results
            .into_iter()
            .filter_map(|r| r.into_observation(run_id))
            .collect())
    }

    async fn run_metadata(&self, run_id: u64) -> Result<RunMetadata, FetchError> {
        let run: ApiRun = self.get(&format!("get_run/{}", run_id)).await?;
        Ok(run.into())
    }

    async fn plan(&self, plan_id: u64) -> Result<PlanSummary, FetchError> {
        let plan: ApiPlan = self.get(&format!("get_plan/{}", plan_id)).await?;
        Ok(plan.into())
    }

    async fn plans(&self, project_id: u64) -> Result<Vec<PlanSummary>, FetchError> {
        let plans: Vec<ApiPlan> = self.get_paged(&format!("get_plans/{}", project_id)).await?;
        Ok(plans.into_iter().map(PlanSummary::from).collect())
    }

    async fn milestone(&self, milestone_id: u64) -> Result<Milestone, FetchError> {
        let milestone: ApiMilestone = self.get(&format!("get_milestone/{}", milestone_id)).await?;
        Ok(milestone.into())
    }
}
