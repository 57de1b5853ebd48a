use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;

use super::{
    RegistryProjects, Robot, RobotCreated, RobotRequest, status_error, transport_error,
};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};

const API_PREFIX: &str = "/api/v2.0";

/// Harbor-style project and robot account API.
pub struct HarborClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HarborClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build registry client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}{API_PREFIX}", config.base_url()),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
    }
}

#[async_trait]
impl RegistryProjects for HarborClient {
    async fn create_robot(&self, request: &RobotRequest) -> Result<RobotCreated> {
        let what = "creating robot account";
        let resp = self
            .request(reqwest::Method::POST, "/robots")
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        if !resp.status().is_success() {
            return Err(status_error(resp, what, Error::Upstream).await);
        }

        resp.json()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))
    }

    async fn get_robot(&self, robot_id: i64) -> Result<Robot> {
        let what = "fetching robot account";
        let resp = self
            .request(reqwest::Method::GET, &format!("/robots/{robot_id}"))
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        if !resp.status().is_success() {
            return Err(status_error(resp, what, Error::Upstream).await);
        }

        resp.json()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))
    }

    async fn update_robot(&self, robot: &Robot) -> Result<()> {
        let what = "updating robot account";
        let resp = self
            .request(reqwest::Method::PUT, &format!("/robots/{}", robot.id))
            .json(robot)
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        if !resp.status().is_success() {
            return Err(status_error(resp, what, Error::Upstream).await);
        }
        Ok(())
    }

    async fn delete_robot(&self, robot_id: i64) -> Result<()> {
        let what = "deleting robot account";
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/robots/{robot_id}"))
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::warn!("Robot account {robot_id} was already absent upstream");
                Ok(())
            }
            _ => Err(status_error(resp, what, Error::Upstream).await),
        }
    }

    async fn project_exists(&self, name: &str) -> Result<bool> {
        let what = "checking project";
        let resp = self
            .request(reqwest::Method::HEAD, "/projects")
            .query(&[("project_name", name)])
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp, what, Error::Upstream).await),
        }
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let what = "creating project";
        let resp = self
            .request(reqwest::Method::POST, "/projects")
            .json(&json!({ "project_name": name, "metadata": { "public": "false" } }))
            .send()
            .await
            .map_err(|e| transport_error(e, what, Error::Upstream))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            // Created concurrently by another request
            StatusCode::CONFLICT => Ok(()),
            _ => Err(status_error(resp, what, Error::Upstream).await),
        }
    }
}
