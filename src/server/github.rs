use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::json;

use super::{GitOrg, GitServer, GitUser, RepoInfo};
use crate::error::{CliError, Result};

const API_BASE: &str = "https://api.github.com";

/// GitHub provider, speaking the v3 REST API with token auth.
pub struct Github {
    client: Client,
    base_url: String,
    token: String,
}

impl Github {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE)
    }

    /// Points the client at a different API root. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Github {
            client: Client::new(),
            base_url: base_url.into(),
            token: String::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "cms-cli")
            .header("Accept", "application/vnd.github.v3+json")
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "cms-cli")
            .header("Accept", "application/vnd.github.v3+json")
    }
}

impl Default for Github {
    fn default() -> Self {
        Self::new()
    }
}

impl GitServer for Github {
    fn name(&self) -> &'static str {
        "Github"
    }

    fn set_token(&mut self, token: &str) {
        self.token = token.to_string();
    }

    fn get_user(&self) -> Result<GitUser> {
        let response = self.get("/user").send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_auth(
                format!("GitHub user lookup failed: {}", response.status()),
                self.get_token_url(),
            ));
        }
        Ok(response.json()?)
    }

    fn get_orgs(&self) -> Result<Vec<GitOrg>> {
        let response = self
            .get("/user/orgs")
            .query(&[("page", "1"), ("per_page", "100")])
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "GitHub org lookup failed: {}",
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
                "GitHub repo lookup failed: {}",
                status
            ))),
        }
    }

    fn create_repo(&self, name: &str) -> Result<RepoInfo> {
        let response = self
            .post("/user/repos")
            .json(&json!({ "name": name }))
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "GitHub repo creation failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn create_org_repo(&self, name: &str, org: &str) -> Result<RepoInfo> {
        let response = self
            .post(&format!("/orgs/{}/repos", org))
            .json(&json!({ "name": name }))
            .send()?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "GitHub org repo creation failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn get_remote(&self, login: &str, name: &str) -> String {
        format!("git@github.com:{}/{}.git", login, name)
    }

    fn get_token_url(&self) -> &'static str {
        "https://github.com/settings/tokens"
    }

    fn get_token_help_url(&self) -> &'static str {
        "https://docs.github.com/en/authentication"
    }

    fn get_ssh_keys_url(&self) -> &'static str {
        "https://github.com/settings/keys"
    }

    fn get_ssh_keys_help_url(&self) -> &'static str {
        "https://docs.github.com/en/authentication/connecting-to-github-with-ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::serve_once;

    #[test]
    fn test_get_repo_maps_404_to_none() {
        let (base, server) = serve_once("404 Not Found", r#"{"message":"Not Found"}"#);
        let mut github = Github::with_base_url(base);
        github.set_token("t0ken");

        assert!(github.get_repo("octocat", "missing").unwrap().is_none());
        server.join().unwrap();
    }

    #[test]
    fn test_get_repo_returns_existing() {
        let (base, server) = serve_once("200 OK", r#"{"name":"demo","full_name":"octocat/demo"}"#);
        let mut github = Github::with_base_url(base);
        github.set_token("t0ken");

        let repo = github.get_repo("octocat", "demo").unwrap().unwrap();
        assert_eq!(repo.name, "demo");
        assert_eq!(repo.full_name.as_deref(), Some("octocat/demo"));
        server.join().unwrap();
    }

    #[test]
    fn test_remote_url_format() {
        let github = Github::new();
        assert_eq!(
            github.get_remote("octocat", "demo"),
            "git@github.com:octocat/demo.git"
        );
    }

    #[test]
    fn test_urls_point_at_github() {
        let github = Github::new();
        assert!(github.get_token_url().contains("github.com"));
        assert!(github.get_ssh_keys_url().contains("github.com"));
    }
}
