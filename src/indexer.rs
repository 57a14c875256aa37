use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{PostId, Profile, SourcePost};
use crate::source::{InteractionSource, PostSource, ProfileSource};

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CountEnvelope {
    count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HiddenEnvelope {
    #[serde(default)]
    creators: Vec<String>,
    #[serde(default)]
    posts: Vec<PostId>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("indexer client user agent required");
        }
        if config.base_url.trim().is_empty() {
            bail!("indexer client base url required");
        }
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("parse indexer url {base}"))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("indexer: base url cannot hold a path"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn send(&self, url: Url) -> Result<Response> {
        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("indexer: request {}", url.path()))?;
        Ok(resp)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let resp = self.send(url)?;
        let resp = check_status(resp)?;
        Ok(resp.json()?)
    }

    fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let resp = self.send(url)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp)?;
        Ok(Some(resp.json()?))
    }

    fn profile(&self, address: &str) -> Result<ProfileEnvelope> {
        let url = self.url(&["profiles", address], &[])?;
        Ok(self.get_optional(url)?.unwrap_or_default())
    }
}

fn check_status(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    match status.as_u16() {
        429 => Err(anyhow!("indexer: rate limited: {}", body)),
        _ => Err(anyhow!("indexer: api error {}: {}", status, body)),
    }
}

impl PostSource for Client {
    fn fetch_posts(&self, start: u64, count: usize) -> Result<Vec<SourcePost>> {
        let url = self.url(
            &["posts"],
            &[("start", start.to_string()), ("limit", count.to_string())],
        )?;
        self.get_json(url).context("fetch posts page")
    }

    fn fetch_post_count(&self) -> Result<u64> {
        let url = self.url(&["posts", "count"], &[])?;
        let envelope: CountEnvelope = self.get_json(url).context("fetch post count")?;
        Ok(envelope.count)
    }

    fn fetch_comments_for_post(&self, id: PostId) -> Result<Vec<SourcePost>> {
        let id = id.to_string();
        let url = self.url(&["posts", &id, "comments"], &[])?;
        self.get_json(url).context("fetch comments")
    }
}

impl ProfileSource for Client {
    fn resolve_display_name(&self, address: &str) -> Result<Option<String>> {
        Ok(self.profile(address)?.display_name)
    }

    fn resolve_avatar(&self, address: &str) -> Result<Option<String>> {
        Ok(self.profile(address)?.avatar)
    }

    fn resolve_profile(&self, address: &str) -> Result<Profile> {
        let envelope = self.profile(address)?;
        Ok(Profile {
            display_name: envelope.display_name.filter(|name| !name.trim().is_empty()),
            avatar: envelope.avatar.filter(|avatar| !avatar.trim().is_empty()),
        })
    }
}

impl InteractionSource for Client {
    fn hidden_creators(&self) -> Result<HashSet<String>> {
        let url = self.url(&["interactions", "hidden"], &[])?;
        let envelope: HiddenEnvelope = self.get_optional(url)?.unwrap_or_default();
        Ok(envelope.creators.into_iter().collect())
    }

    fn hidden_post_ids(&self) -> Result<HashSet<PostId>> {
        let url = self.url(&["interactions", "hidden"], &[])?;
        let envelope: HiddenEnvelope = self.get_optional(url)?.unwrap_or_default();
        Ok(envelope.posts.into_iter().collect())
    }
}
