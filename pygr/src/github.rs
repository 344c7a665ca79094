//! GitHub API client
//!
//! Blocking client used to resolve refs to commits, look up default
//! branches, and run repository searches. Requests carry a bearer token when
//! `GITHUB_TOKEN` is set; unauthenticated access works for public repos
//! within GitHub's rate limits.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::error::{Error, Result};

const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GitRef {
    #[serde(rename = "ref")]
    name: String,
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

/// One repository search hit
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchResult>,
}

/// GitHub API client
pub struct GitHubClient {
    client: Client,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("pygr/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(ref token) = self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// Resolve a branch or tag name to a commit id.
    ///
    /// Lists the repository's refs and matches `refs/heads/{r}` first, then
    /// `refs/tags/{r}`.
    pub fn resolve_ref(&self, repo: &str, reference: &str) -> Result<String> {
        let url = format!("{}/repos/{}/git/refs", GITHUB_API_BASE, repo);
        let response = self.client.get(&url).headers(self.headers()).send()?;

        if !response.status().is_success() {
            return Err(Error::UnresolvableRef {
                repo: repo.to_string(),
                reference: reference.to_string(),
            });
        }

        let refs: Vec<GitRef> = response.json()?;
        let head = format!("refs/heads/{}", reference);
        let tag = format!("refs/tags/{}", reference);

        refs.iter()
            .find(|r| r.name == head)
            .or_else(|| refs.iter().find(|r| r.name == tag))
            .map(|r| r.object.sha.clone())
            .ok_or_else(|| Error::UnresolvableRef {
                repo: repo.to_string(),
                reference: reference.to_string(),
            })
    }

    /// Default branch of a repository.
    pub fn default_branch(&self, repo: &str) -> Result<String> {
        let url = format!("{}/repos/{}", GITHUB_API_BASE, repo);
        let response = self.client.get(&url).headers(self.headers()).send()?;

        if !response.status().is_success() {
            return Err(Error::FetchFailed(format!(
                "cannot query {}: HTTP {}",
                repo,
                response.status()
            )));
        }

        let info: RepoInfo = response.json()?;
        Ok(info.default_branch)
    }

    /// Search repositories, best matches first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/search/repositories?q={}&per_page={}",
            GITHUB_API_BASE,
            urlencode(query),
            limit
        );
        let response = self.client.get(&url).headers(self.headers()).send()?;

        if !response.status().is_success() {
            return Err(Error::FetchFailed(format!(
                "search failed: HTTP {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response.json()?;
        Ok(parsed.items)
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("ripgrep"), "ripgrep");
        assert_eq!(urlencode("rip grep"), "rip+grep");
        assert_eq!(urlencode("c++"), "c%2B%2B");
    }
}
