use crate::{
    config::BackendConfig,
    error::ApiError,
    http_client::{backend_client, handle_api_response},
    types::{
        AnalyzeImagesRequest, CreatedUser, ExistsResponse, ImageAnalysis, NewReport, NewUser,
        Report, ReportUpdate, User, UserField, UserProfile, UserStatus,
    },
};
use anyhow::Result;
use log::info;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, IntoUrl, RequestBuilder, Url};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::{Debug, Display};
use trait_variant::make;

/// Operations of the monitoring backend REST API
///
/// Every call authenticates with `Authorization: Bearer <token>`.
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait BackendApi {
    async fn me(&self, token: &str) -> Result<UserProfile, ApiError>;
    async fn logout(&self, token: &str) -> Result<(), ApiError>;

    async fn reports(
        &self,
        token: &str,
        assigned_supervisor: Option<String>,
    ) -> Result<Vec<Report>, ApiError>;
    async fn create_report(&self, token: &str, report: NewReport) -> Result<Report, ApiError>;
    async fn update_report(
        &self,
        token: &str,
        id: &str,
        update: ReportUpdate,
    ) -> Result<(), ApiError>;
    async fn delete_report(&self, token: &str, id: &str) -> Result<(), ApiError>;
    async fn analyze_images(
        &self,
        token: &str,
        image_urls: Vec<String>,
    ) -> Result<ImageAnalysis, ApiError>;

    async fn users(&self, token: &str) -> Result<Vec<User>, ApiError>;
    async fn users_status(&self, token: &str) -> Result<Vec<UserStatus>, ApiError>;
    async fn user_exists(
        &self,
        token: &str,
        field: UserField,
        value: String,
    ) -> Result<bool, ApiError>;
    async fn create_user(&self, token: &str, user: NewUser) -> Result<User, ApiError>;
    async fn delete_user(&self, token: &str, username: &str) -> Result<(), ApiError>;

    /// Absolute URL of a backend-relative path such as a report image
    fn resolve_url(&self, path: &str) -> String;
}

#[derive(Clone)]
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
}

impl HttpBackendClient {
    // API endpoint constants
    const ME_ENDPOINT: &str = "/api/auth/me";
    const LOGOUT_ENDPOINT: &str = "/api/auth/logout";
    const REPORTS_ENDPOINT: &str = "/api/reports";
    const ANALYZE_IMAGES_ENDPOINT: &str = "/api/analyze_images";
    const USERS_STATUS_ENDPOINT: &str = "/api/users/status";
    const ADMIN_USERS_ENDPOINT: &str = "/api/admin/users";
    const ADMIN_USERS_CHECK_ENDPOINT: &str = "/api/admin/users/check";

    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(HttpBackendClient {
            client: backend_client(config.request_timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        // Normalize path to always start with a single "/"
        let normalized_path = path.trim_start_matches('/');
        format!("{}/{normalized_path}", self.base_url)
    }

    /// URL of the resource `id` below `endpoint`, with `id` encoded as one path segment
    fn resource_url(&self, endpoint: &str, id: &str) -> Result<Url, ApiError> {
        if matches!(id, "" | "." | "..") {
            return Err(ApiError::Invalid(format!("invalid resource id '{id}'")));
        }

        let mut url = Url::parse(&self.build_url(endpoint))
            .map_err(|e| ApiError::Invalid(format!("invalid backend URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Invalid(format!("{endpoint} cannot take an id")))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let res = request.send().await?;
        handle_api_response(res).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn get(&self, token: &str, url: impl IntoUrl + Display) -> RequestBuilder {
        info!("GET {url}");
        self.client.get(url).bearer_auth(token)
    }

    fn delete(&self, token: &str, url: impl IntoUrl + Display) -> RequestBuilder {
        info!("DELETE {url}");
        self.client.delete(url).bearer_auth(token)
    }

    fn post_json(
        &self,
        token: &str,
        url: impl IntoUrl + Display,
        body: &(impl Debug + Serialize),
    ) -> RequestBuilder {
        info!("POST {url}");
        log::debug!("POST {url} with body: {body:?}");
        self.client.post(url).bearer_auth(token).json(body)
    }

    fn put_json(
        &self,
        token: &str,
        url: impl IntoUrl + Display,
        body: &(impl Debug + Serialize),
    ) -> RequestBuilder {
        info!("PUT {url} with body: {body:?}");
        self.client.put(url).bearer_auth(token).json(body)
    }
}

impl BackendApi for HttpBackendClient {
    async fn me(&self, token: &str) -> Result<UserProfile, ApiError> {
        self.send_json(self.get(token, self.build_url(Self::ME_ENDPOINT))).await
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let url = self.build_url(Self::LOGOUT_ENDPOINT);
        self.send(self.post_json(token, url, &serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn reports(
        &self,
        token: &str,
        assigned_supervisor: Option<String>,
    ) -> Result<Vec<Report>, ApiError> {
        let mut request = self.get(token, self.build_url(Self::REPORTS_ENDPOINT));
        if let Some(supervisor) = assigned_supervisor {
            request = request.query(&[("assigned_supervisor", supervisor)]);
        }
        self.send_json(request).await
    }

    async fn create_report(&self, token: &str, report: NewReport) -> Result<Report, ApiError> {
        let url = self.build_url(Self::REPORTS_ENDPOINT);
        self.send_json(self.post_json(token, url, &report)).await
    }

    async fn update_report(
        &self,
        token: &str,
        id: &str,
        update: ReportUpdate,
    ) -> Result<(), ApiError> {
        let url = self.resource_url(Self::REPORTS_ENDPOINT, id)?;
        self.send(self.put_json(token, url, &update)).await?;
        Ok(())
    }

    async fn delete_report(&self, token: &str, id: &str) -> Result<(), ApiError> {
        let url = self.resource_url(Self::REPORTS_ENDPOINT, id)?;
        self.send(self.delete(token, url)).await?;
        Ok(())
    }

    async fn analyze_images(
        &self,
        token: &str,
        image_urls: Vec<String>,
    ) -> Result<ImageAnalysis, ApiError> {
        let body = AnalyzeImagesRequest { image_urls };
        let url = self.build_url(Self::ANALYZE_IMAGES_ENDPOINT);
        self.send_json(self.post_json(token, url, &body)).await
    }

    async fn users(&self, token: &str) -> Result<Vec<User>, ApiError> {
        self.send_json(self.get(token, self.build_url(Self::ADMIN_USERS_ENDPOINT)))
            .await
    }

    async fn users_status(&self, token: &str) -> Result<Vec<UserStatus>, ApiError> {
        self.send_json(self.get(token, self.build_url(Self::USERS_STATUS_ENDPOINT)))
            .await
    }

    async fn user_exists(
        &self,
        token: &str,
        field: UserField,
        value: String,
    ) -> Result<bool, ApiError> {
        let request = self
            .get(token, self.build_url(Self::ADMIN_USERS_CHECK_ENDPOINT))
            .query(&[(field.query_key(), value)]);
        let response: ExistsResponse = self.send_json(request).await?;
        Ok(response.exists)
    }

    async fn create_user(&self, token: &str, user: NewUser) -> Result<User, ApiError> {
        let created: CreatedUser = self
            .send_json(self.post_json(
                token,
                self.build_url(Self::ADMIN_USERS_ENDPOINT),
                &PasswordRedacted(&user),
            ))
            .await?;
        Ok(created.user)
    }

    async fn delete_user(&self, token: &str, username: &str) -> Result<(), ApiError> {
        let url = self.resource_url(Self::ADMIN_USERS_ENDPOINT, username)?;
        self.send(self.delete(token, url)).await?;
        Ok(())
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.build_url(path)
        }
    }
}

/// Serializes the wrapped user unchanged but keeps the password out of logs
struct PasswordRedacted<'a>(&'a NewUser);

impl Serialize for PasswordRedacted<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl Debug for PasswordRedacted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.0.username)
            .field("email", &self.0.email)
            .field("role", &self.0.role)
            .finish_non_exhaustive()
    }
}
