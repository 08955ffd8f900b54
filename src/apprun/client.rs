//! `AppRun` Dedicated API client implementation.
//!
//! This module provides the HTTP client for the `AppRun` Dedicated REST API.
//! Requests authenticate with HTTP basic auth (access token and secret).

use async_trait::async_trait;
use reqwest::{Client, Method, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::Credentials;
use crate::error::{ApiError, ProvisionerError, Result};

use super::gateway::Gateway;
use super::types::{
    Application, ApplicationVersion, ApplicationVersionResponse, AutoScalingGroup,
    AutoScalingGroupResponse, ClusterDetail, ClusterSummary, CreateApplicationRequest,
    CreateApplicationResponse, CreateAutoScalingGroupRequest, CreateAutoScalingGroupResponse,
    CreateLoadBalancerRequest, CreateLoadBalancerResponse, CreateVersionRequest,
    CreateVersionResponse, GetClusterResponse, ListApplicationsResponse,
    ListAutoScalingGroupsResponse, ListClustersResponse, ListLoadBalancersResponse,
    ListVersionsResponse, LoadBalancer, LoadBalancerResponse, LoadBalancerSummary, Page,
    UpdateApplicationRequest, UpdateClusterRequest, VersionSummary,
};

/// `AppRun` Dedicated API base URL.
pub const DEFAULT_API_URL: &str = "https://secure.sakura.ad.jp/cloud/api/apprun-dedicated/1.0";

/// Page size requested from list endpoints.
pub const PAGE_SIZE: u32 = 30;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for idempotent reads.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// `AppRun` Dedicated API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    base_url: String,
    /// Basic auth credentials.
    credentials: Credentials,
}

impl ApiClient {
    /// Creates a new API client against the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(credentials: Credentials, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
            credentials,
        })
    }

    /// Points the client at a different API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_query(cursor: Option<String>) -> Vec<(&'static str, String)> {
        let mut query = vec![("max_items", PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        query
    }

    /// Executes an idempotent GET, retrying transient failures.
    ///
    /// A rate-limited response waits for the server's `Retry-After`; other
    /// transient failures back off linearly.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut last_error: Option<ProvisionerError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(ProvisionerError::retry_delay_secs)
                    .map_or_else(
                        || Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)),
                        Duration::from_secs,
                    );
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for GET {path} in {delay:?}");
                tokio::time::sleep(delay).await;
            }

            let result = async {
                let response = self.send(Method::GET, path, query, None::<&()>).await?;
                Self::parse(response).await
            }
            .await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::network("Max retries exceeded").into()))
    }

    /// Executes a mutation once and parses the response body.
    async fn mutate<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.send(method, path, &[], body).await?;
        Self::parse(response).await
    }

    /// Executes a mutation once, ignoring any response body.
    async fn mutate_no_content<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        self.send(method, path, &[], body).await.map(|_| ())
    }

    /// Sends a single request and maps error statuses.
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response> {
        let url = format!("{}{path}", self.base_url);
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(
                &self.credentials.access_token,
                Some(&self.credentials.access_token_secret),
            )
            .header(header::ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            ProvisionerError::Api(ApiError::NetworkError {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(ProvisionerError::Api(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionerError::Api(ApiError::AuthenticationFailed {
                message: if body.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    body
                },
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionerError::Api(ApiError::api_error(status.as_u16(), body)));
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse response: {e}")).into())
    }
}

#[async_trait]
impl Gateway for ApiClient {
    async fn list_clusters(&self, cursor: Option<String>) -> Result<Page<ClusterSummary>> {
        let response: ListClustersResponse = self.get("/clusters", &Self::page_query(cursor)).await?;
        Ok(Page::new(response.clusters, response.next_cursor))
    }

    async fn get_cluster(&self, cluster_id: Uuid) -> Result<ClusterDetail> {
        let response: GetClusterResponse = self.get(&format!("/clusters/{cluster_id}"), &[]).await?;
        Ok(response.cluster)
    }

    async fn update_cluster(&self, cluster_id: Uuid, request: &UpdateClusterRequest) -> Result<()> {
        self.mutate_no_content(Method::PUT, &format!("/clusters/{cluster_id}"), Some(request))
            .await
    }

    async fn list_auto_scaling_groups(
        &self,
        cluster_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<AutoScalingGroup>> {
        let response: ListAutoScalingGroupsResponse = self
            .get(
                &format!("/clusters/{cluster_id}/auto_scaling_groups"),
                &Self::page_query(cursor),
            )
            .await?;
        Ok(Page::new(response.auto_scaling_groups, response.next_cursor))
    }

    async fn get_auto_scaling_group(&self, cluster_id: Uuid, asg_id: Uuid) -> Result<AutoScalingGroup> {
        let response: AutoScalingGroupResponse = self
            .get(&format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}"), &[])
            .await?;
        Ok(response.auto_scaling_group)
    }

    async fn create_auto_scaling_group(
        &self,
        cluster_id: Uuid,
        request: &CreateAutoScalingGroupRequest,
    ) -> Result<Uuid> {
        let response: CreateAutoScalingGroupResponse = self
            .mutate(
                Method::POST,
                &format!("/clusters/{cluster_id}/auto_scaling_groups"),
                Some(request),
            )
            .await?;
        Ok(response.auto_scaling_group.auto_scaling_group_id)
    }

    async fn delete_auto_scaling_group(&self, cluster_id: Uuid, asg_id: Uuid) -> Result<()> {
        self.mutate_no_content(
            Method::DELETE,
            &format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}"),
            None::<&()>,
        )
        .await
    }

    async fn list_load_balancers(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancerSummary>> {
        let response: ListLoadBalancersResponse = self
            .get(
                &format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}/load_balancers"),
                &Self::page_query(cursor),
            )
            .await?;
        Ok(Page::new(response.load_balancers, response.next_cursor))
    }

    async fn get_load_balancer(&self, cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<LoadBalancer> {
        let response: LoadBalancerResponse = self
            .get(
                &format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}/load_balancers/{lb_id}"),
                &[],
            )
            .await?;
        Ok(response.load_balancer)
    }

    async fn create_load_balancer(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        request: &CreateLoadBalancerRequest,
    ) -> Result<Uuid> {
        let response: CreateLoadBalancerResponse = self
            .mutate(
                Method::POST,
                &format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}/load_balancers"),
                Some(request),
            )
            .await?;
        Ok(response.load_balancer.load_balancer_id)
    }

    async fn delete_load_balancer(&self, cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<()> {
        self.mutate_no_content(
            Method::DELETE,
            &format!("/clusters/{cluster_id}/auto_scaling_groups/{asg_id}/load_balancers/{lb_id}"),
            None::<&()>,
        )
        .await
    }

    async fn list_applications(&self, cluster_id: Uuid, cursor: Option<String>) -> Result<Page<Application>> {
        let mut query = Self::page_query(cursor);
        query.push(("cluster_id", cluster_id.to_string()));

        let response: ListApplicationsResponse = self.get("/applications", &query).await?;
        Ok(Page::new(response.applications, response.next_cursor))
    }

    async fn create_application(&self, request: &CreateApplicationRequest) -> Result<Uuid> {
        let response: CreateApplicationResponse = self
            .mutate(Method::POST, "/applications", Some(request))
            .await?;
        Ok(response.application.application_id)
    }

    async fn update_application(&self, application_id: Uuid, request: &UpdateApplicationRequest) -> Result<()> {
        self.mutate_no_content(
            Method::PATCH,
            &format!("/applications/{application_id}"),
            Some(request),
        )
        .await
    }

    async fn list_application_versions(
        &self,
        application_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<VersionSummary>> {
        let response: ListVersionsResponse = self
            .get(
                &format!("/applications/{application_id}/versions"),
                &Self::page_query(cursor),
            )
            .await?;
        Ok(Page::new(response.versions, response.next_cursor))
    }

    async fn get_application_version(&self, application_id: Uuid, version: i32) -> Result<ApplicationVersion> {
        let response: ApplicationVersionResponse = self
            .get(&format!("/applications/{application_id}/versions/{version}"), &[])
            .await?;
        Ok(response.application_version)
    }

    async fn create_application_version(
        &self,
        application_id: Uuid,
        request: &CreateVersionRequest,
    ) -> Result<i32> {
        let response: CreateVersionResponse = self
            .mutate(
                Method::POST,
                &format!("/applications/{application_id}/versions"),
                Some(request),
            )
            .await?;
        Ok(response.application_version.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apprun::RegistryPasswordAction;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials {
            access_token: "token".to_string(),
            access_token_secret: "secret".to_string(),
        }
    }

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(credentials())
            .expect("client")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_clusters_sends_basic_auth_and_cursor() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/clusters"))
            .and(query_param("max_items", "30"))
            .and(query_param("cursor", "page-2"))
            .and(header("authorization", "Basic dG9rZW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [{"clusterId": id, "name": "prod"}],
                "nextCursor": 60
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .await
            .list_clusters(Some("page-2".to_string()))
            .await
            .expect("list");

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].cluster_id, id);
        assert_eq!(page.next_cursor.as_deref(), Some("60"));
    }

    #[tokio::test]
    async fn test_rate_limited_get_waits_for_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/clusters"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clusters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clusters": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let result = client_for(&server).await.list_clusters(None).await;

        tokio_test::assert_ok!(result);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_error_body_is_attached() {
        let server = MockServer::start().await;
        let cluster_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/clusters/{cluster_id}/auto_scaling_groups")))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"message":"zone is invalid"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateAutoScalingGroupRequest {
            name: "workers".to_string(),
            zone: "nowhere".to_string(),
            worker_service_class_path: "w".to_string(),
            min_nodes: 1,
            max_nodes: 2,
            name_servers: vec![],
            interfaces: vec![],
        };

        let err = client_for(&server)
            .await
            .create_auto_scaling_group(cluster_id, &request)
            .await
            .expect_err("should fail");

        match err {
            ProvisionerError::Api(ApiError::RequestFailed { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("zone is invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/clusters"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .list_clusters(None)
            .await
            .expect_err("should fail");
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_activate_sends_patch() {
        let server = MockServer::start().await;
        let app_id = Uuid::new_v4();

        Mock::given(method("PATCH"))
            .and(path(format!("/applications/{app_id}")))
            .and(body_json(json!({"activeVersion": 3})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .update_application(
                app_id,
                &UpdateApplicationRequest {
                    active_version: Some(3),
                },
            )
            .await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_create_version_returns_number() {
        let server = MockServer::start().await;
        let app_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/applications/{app_id}/versions")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "applicationVersion": {"version": 7}
            })))
            .mount(&server)
            .await;

        let request = CreateVersionRequest {
            cpu: 500,
            memory: 1024,
            scaling_mode: "manual".to_string(),
            fixed_scale: Some(1),
            min_scale: None,
            max_scale: None,
            scale_in_threshold: None,
            scale_out_threshold: None,
            image: "nginx:1.27".to_string(),
            cmd: vec![],
            registry_username: None,
            registry_password: None,
            registry_password_action: RegistryPasswordAction::Remove,
            exposed_ports: vec![],
            env: vec![],
        };

        let version = client_for(&server)
            .await
            .create_application_version(app_id, &request)
            .await
            .expect("create");
        assert_eq!(version, 7);
    }

    #[tokio::test]
    async fn test_list_applications_filters_by_cluster() {
        let server = MockServer::start().await;
        let cluster_id = Uuid::new_v4();
        let app_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/applications"))
            .and(query_param("cluster_id", cluster_id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "applications": [{
                    "applicationId": app_id,
                    "name": "web",
                    "clusterId": cluster_id,
                    "activeVersion": 2
                }],
                "nextCursor": ""
            })))
            .mount(&server)
            .await;

        let page = client_for(&server)
            .await
            .list_applications(cluster_id, None)
            .await
            .expect("list");
        assert_eq!(page.items[0].active_version, Some(2));
        assert!(page.next_cursor.is_none());
    }
}
