use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::json;

use super::{GitOrg, GitServer, GitUser, RepoInfo};
use crate::error::{CliError, Result};

const API_BASE: &str = "https://gitee.com/api/v5";

/// Gitee provider. Unlike GitHub, the token travels as a query parameter.
pub struct Gitee {
    client: Client,
    base_url: String,
    token: String,
}

impl Gitee {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE)
    }

    /// Points the client at a different API root. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Gitee {
            client: Client::new(),
            base_url: base_url.into(),
            token: String::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("access_token", self.token.as_str())])
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url, path))
    }
}

impl Default for Gitee {
    fn default() -> Self {
        Self::new()
    }
}

impl GitServer for Gitee {
    fn name(&self) -> &'static str {
        "Gitee"
    }

    fn set_token(&mut self, token: &str) {
        self.token = token.to_string();
    }

    fn get_user(&self) -> Result<GitUser> {
        let response = self.get("/user").send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_auth(
                format!("Gitee user lookup failed: {}", response.status()),
                self.get_token_url(),
            ));
        }
        Ok(response.json()?)
    }

    fn get_orgs(&self) -> Result<Vec<GitOrg>> {
        let response = self
            .get("/user/orgs")
            .query(&[("page", "1"), ("per_page", "100"), ("admin", "false")])
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "Gitee org lookup failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn get_repo(&self, login: &str, name: &str) -> Result<Option<RepoInfo>> {
        let response = self.get(&format!("/repos/{}/{}", login, name)).send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json()?)),
            status => Err(CliError::remote_state(format!(
                "Gitee repo lookup failed: {}",
                status
            ))),
        }
    }

    fn create_repo(&self, name: &str) -> Result<RepoInfo> {
        let response = self
            .post("/user/repos")
            .json(&json!({ "name": name, "access_token": self.token }))
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "Gitee repo creation failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn create_org_repo(&self, name: &str, org: &str) -> Result<RepoInfo> {
        let response = self
            .post(&format!("/orgs/{}/repos", org))
            .json(&json!({ "name": name, "access_token": self.token }))
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "Gitee org repo creation failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn get_remote(&self, login: &str, name: &str) -> String {
        format!("git@gitee.com:{}/{}.git", login, name)
    }

    fn get_token_url(&self) -> &'static str {
        "https://gitee.com/profile/personal_access_tokens"
    }

    fn get_token_help_url(&self) -> &'static str {
        "https://gitee.com/help/articles/4191"
    }

    fn get_ssh_keys_url(&self) -> &'static str {
        "https://gitee.com/profile/sshkeys"
    }

    fn get_ssh_keys_help_url(&self) -> &'static str {
        "https://gitee.com/help/articles/4191"
    }
}
