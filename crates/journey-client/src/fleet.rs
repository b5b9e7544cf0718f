//! Typed client for the control-plane HTTP API.

use std::time::Duration;

use journey_protocol::{
    CircuitBreakerState, EnsureServiceRequest, EnsureServiceResponse, FeatureFlagSet, FlagUpdateRequest,
    FlagUpdateResponse, JourneyRun, LoadStartRequest, LoadStartResponse, LoadStopRequest,
    LoadTest, ServiceInstanceInfo, SimulateRequest, routes,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::transport::{build_client, execute};

#[derive(Debug, Clone)]
pub struct FleetClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl FleetClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http: build_client()?,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Same connection pool, different per-request cap.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        execute(self.http.get(self.url(path)), self.timeout)
            .await?
            .json()
    }

    async fn post<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        execute(self.http.post(self.url(path)).json(body), self.timeout)
            .await?
            .json()
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.get(routes::HEALTH).await
    }

    pub async fn ensure_service(
        &self,
        service_name: &str,
    ) -> Result<EnsureServiceResponse, ClientError> {
        let body = EnsureServiceRequest {
            service_name: service_name.to_string(),
        };
        self.post(routes::ENSURE_SERVICE, &body).await
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceInstanceInfo>, ClientError> {
        self.get(routes::SERVICES).await
    }

    pub async fn terminate_service(
        &self,
        service_name: &str,
    ) -> Result<ServiceInstanceInfo, ClientError> {
        execute(
            self.http.delete(self.url(&routes::service(service_name))),
            self.timeout,
        )
        .await?
        .json()
    }

    pub async fn circuit_breakers(&self) -> Result<Vec<CircuitBreakerState>, ClientError> {
        self.get(routes::CIRCUIT_BREAKERS).await
    }

    pub async fn simulate(&self, request: &SimulateRequest) -> Result<JourneyRun, ClientError> {
        self.post(routes::SIMULATE_JOURNEY, request).await
    }

    pub async fn feature_flags(&self) -> Result<FeatureFlagSet, ClientError> {
        self.get(routes::FEATURE_FLAGS).await
    }

    pub async fn update_feature_flags(
        &self,
        update: &FlagUpdateRequest,
    ) -> Result<FlagUpdateResponse, ClientError> {
        self.post(routes::FEATURE_FLAGS, update).await
    }

    pub async fn load_start(
        &self,
        request: &LoadStartRequest,
    ) -> Result<LoadStartResponse, ClientError> {
        self.post(routes::LOAD_START, request).await
    }

    pub async fn load_stop(&self, load_test_id: &str) -> Result<LoadTest, ClientError> {
        let body = LoadStopRequest {
            load_test_id: load_test_id.to_string(),
        };
        self.post(routes::LOAD_STOP, &body).await
    }

    pub async fn load_status(&self) -> Result<Vec<LoadTest>, ClientError> {
        self.get(routes::LOAD_STATUS).await
    }

    pub async fn load_stop_all(&self) -> Result<Vec<LoadTest>, ClientError> {
        self.post(routes::LOAD_STOP_ALL, &serde_json::json!({})).await
    }
}
