//! CRUD operations against the workspace/project REST API.
//!
//! Every operation builds a request body from dialog form data (free-text
//! tag and share fields become arrays), attaches the anti-forgery token,
//! validates the HTTP outcome and normalizes the result. Edit-style
//! operations merge the server response back into the caller's `Project`
//! field by field, so other holders of the same object observe the update.

use std::sync::Arc;

use reqwest::Method;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ServerConfig;
use crate::credentials::{CSRF_HEADER, CredentialStore};
use crate::error::{PortalError, Result};
use crate::transport::{ACCEPT_JSON, ApiRequest, CONTENT_TYPE_JSON, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAccess {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub owner: bool,
}

impl ProjectAccess {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            group: None,
            owner: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub dir_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub access: Vec<ProjectAccess>,
    /// URL of the published copy, if one exists.
    #[serde(default)]
    pub published: Option<String>,
}

impl Project {
    pub fn is_published(&self) -> bool {
        self.published.is_some()
    }

    pub fn is_shared(&self) -> bool {
        self.access.len() > 1
    }

    /// A user owns the project unless an access entry for them says
    /// otherwise.
    pub fn is_owner(&self, username: &str) -> bool {
        self.access
            .iter()
            .find(|a| a.user.as_deref() == Some(username))
            .map(|a| a.owner)
            .unwrap_or(true)
    }

    /// Usernames the project is shared with, excluding `current_user`.
    pub fn share_list(&self, current_user: &str) -> Vec<String> {
        self.access
            .iter()
            .filter_map(|a| a.user.as_deref())
            .filter(|user| *user != current_user)
            .map(str::to_owned)
            .collect()
    }

    /// Shallow key-wise overwrite from a server response. Fields absent from
    /// the response keep their current values.
    fn merge_from(&mut self, value: &Value) {
        let Some(map) = value.as_object() else { return };
        for (field, slot) in [
            ("url", &mut self.url),
            ("name", &mut self.name),
            ("image", &mut self.image),
            ("description", &mut self.description),
            ("authors", &mut self.authors),
            ("quality", &mut self.quality),
            ("path", &mut self.path),
            ("dir_name", &mut self.dir_name),
        ] {
            if let Some(v) = map.get(field).and_then(Value::as_str) {
                *slot = v.to_owned();
            }
        }
        if let Some(v) = map.get("tags")
            && let Ok(tags) = serde_json::from_value(v.clone())
        {
            self.tags = tags;
        }
        if let Some(v) = map.get("access")
            && let Ok(access) = serde_json::from_value(v.clone())
        {
            self.access = access;
        }
        if let Some(v) = map.get("published") {
            self.published = v.as_str().map(str::to_owned);
        }
    }
}

/// Form data collected by the create/edit/publish dialogs. Tags arrive as
/// free text and are split at the request boundary.
#[derive(Debug, Clone, Default)]
pub struct ProjectForm {
    pub name: String,
    pub image: String,
    pub description: String,
    pub authors: String,
    pub quality: String,
    pub tags: String,
    pub path: String,
}

impl ProjectForm {
    fn body(&self) -> Value {
        json!({
            "name": self.name,
            "image": self.image,
            "description": self.description,
            "authors": self.authors,
            "quality": self.quality,
            "tags": split_tags(&self.tags),
            "path": self.path,
        })
    }

    fn apply_to(&self, project: &mut Project) {
        project.name = self.name.clone();
        project.image = self.image.clone();
        project.description = self.description.clone();
        project.authors = self.authors.clone();
        project.quality = self.quality.clone();
        project.path = self.path.clone();
        project.tags = split_tags(&self.tags);
    }
}

/// Server readiness map returned by the user status endpoint, keyed by the
/// project `dir_name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserStatus {
    #[serde(default)]
    pub servers: FxHashMap<String, ServerStatus>,
}

impl UserStatus {
    pub fn is_running(&self, dir_name: &str) -> bool {
        self.servers.get(dir_name).map(|s| s.ready).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub ready: bool,
}

/// Response of launching a public notebook copy.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchedServer {
    pub url: String,
}

/// Split a free-text comma-separated tag field into a normalized array.
/// Empty input yields an empty array, never `[""]`.
pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.trim()
        .to_lowercase()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Split a share list. Usernames are case-sensitive, so no lowercasing.
fn split_shares(raw: &str) -> Vec<String> {
    raw.trim()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Encode a project name the way the hub encodes server names:
/// percent-encode everything outside the hub's safe set, swap `%` for `-`
/// and lowercase.
pub fn hub_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '!' | '*' | '\'' | '(' | ')' => encoded.push(c),
            _ => {
                let mut buf = [0; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    encoded.push_str(&format!("-{b:02X}"));
                }
            }
        }
    }
    encoded.to_lowercase()
}

/// Reconcile a free-text share list against the existing access list.
///
/// Owner entries are always retained so a share edit cannot orphan the
/// project. Usernames already present keep their existing entry (with its
/// group/owner flags); new usernames get a plain non-owner entry. Everyone
/// else is dropped: the share endpoint replaces the full access list.
pub(crate) fn reconcile_access(existing: &[ProjectAccess], shares: &str) -> Vec<ProjectAccess> {
    let mut reconciled: Vec<ProjectAccess> =
        existing.iter().filter(|a| a.owner).cloned().collect();

    for name in split_shares(shares) {
        if reconciled.iter().any(|a| a.user.as_deref() == Some(&name)) {
            continue;
        }
        match existing.iter().find(|a| a.user.as_deref() == Some(&name)) {
            Some(old) => reconciled.push(old.clone()),
            None => reconciled.push(ProjectAccess::for_user(name)),
        }
    }

    reconciled
}

/// Client for the project/workspace REST API.
pub struct ProjectClient {
    transport: Arc<dyn Transport>,
    config: Arc<ServerConfig>,
    store: Arc<CredentialStore>,
}

impl ProjectClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ServerConfig>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            transport,
            config,
            store,
        }
    }

    /// Request skeleton for mutating calls: JSON accept/content headers plus
    /// the anti-forgery token when one is available.
    fn request(&self, method: Method, url: impl Into<String>) -> ApiRequest {
        let mut request = ApiRequest::new(method, url)
            .header(ACCEPT_JSON.0, ACCEPT_JSON.1)
            .header(CONTENT_TYPE_JSON.0, CONTENT_TYPE_JSON.1);
        if let Some(token) = self.store.csrf_token() {
            request = request.header(CSRF_HEADER, token);
        }
        request
    }

    /// Current user's project listing. The portal returns the array with no
    /// envelope.
    pub async fn list(&self) -> Result<Vec<Project>> {
        let response = self
            .transport
            .send(ApiRequest::get(self.config.portal("/rest/projects/")))
            .await?
            .into_result()?;
        Ok(serde_json::from_str(&response.body)?)
    }

    pub async fn create(&self, form: &ProjectForm) -> Result<Project> {
        let mut body = form.body();
        body["dir_name"] = Value::String(hub_encode(&form.name));

        let response = self
            .transport
            .send(
                self.request(Method::POST, self.config.portal("/rest/projects/"))
                    .json(body),
            )
            .await?
            .into_result()?;
        Ok(serde_json::from_str(&response.body)?)
    }

    pub async fn delete(&self, project: &Project) -> Result<()> {
        self.transport
            .send(self.request(Method::DELETE, &project.url))
            .await?
            .into_result()?;
        Ok(())
    }

    pub async fn launch(&self, project: &Project) -> Result<()> {
        self.transport
            .send(self.request(Method::POST, format!("{}launch/", project.url)))
            .await?
            .into_result()?;
        Ok(())
    }

    /// Launch a public notebook copy; the response carries the URL of the
    /// spawned server.
    pub async fn launch_public(&self, notebook_url: &str) -> Result<LaunchedServer> {
        let response = self
            .transport
            .send(self.request(Method::POST, format!("{notebook_url}launch/")))
            .await?
            .into_result()?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Apply `form` to `project`, PUT the updated project and merge the
    /// response back into it.
    pub async fn edit(&self, project: &mut Project, form: &ProjectForm) -> Result<()> {
        form.apply_to(project);

        let response = self
            .transport
            .send(
                self.request(Method::PUT, &project.url)
                    .json(serde_json::to_value(&*project)?),
            )
            .await?
            .into_result()?;
        project.merge_from(&response.json()?);
        Ok(())
    }

    /// Replace the project's access list with the reconciled share list.
    /// Returns any warning messages the server reports (e.g. unknown
    /// usernames).
    pub async fn share(&self, project: &mut Project, shares: &str) -> Result<Vec<String>> {
        let access = reconcile_access(&project.access, shares);

        let response = self
            .transport
            .send(
                self.request(Method::PUT, format!("{}share/", project.url))
                    .json(serde_json::to_value(&access)?),
            )
            .await?
            .into_result()?;

        let messages: Vec<String> = serde_json::from_str(&response.body).unwrap_or_default();
        project.access = access;
        Ok(messages)
    }

    /// Publish a project: update the source first, then create the published
    /// copy. The copy is never created when the source edit fails.
    pub async fn publish(&self, project: &mut Project, form: &ProjectForm) -> Result<()> {
        self.edit(project, form).await?;

        let mut body = form.body();
        body["source"] = Value::String(project.url.clone());

        let response = self
            .transport
            .send(
                self.request(Method::POST, self.config.portal("/rest/notebooks/"))
                    .json(body),
            )
            .await?
            .into_result()?;

        if let Ok(value) = response.json()
            && let Some(url) = value.get("url").and_then(Value::as_str)
        {
            project.published = Some(url.to_owned());
        }
        debug!(project = %project.name, "project published");
        Ok(())
    }

    /// Push updated metadata to an already-published copy.
    pub async fn update_published(&self, project: &mut Project, form: &ProjectForm) -> Result<()> {
        self.edit(project, form).await?;

        let published = project
            .published
            .clone()
            .ok_or(PortalError::NotPublished)?;
        let mut body = form.body();
        body["source"] = Value::String(project.url.clone());

        self.transport
            .send(self.request(Method::PUT, published).json(body))
            .await?
            .into_result()?;
        Ok(())
    }

    pub async fn unpublish(&self, project: &mut Project) -> Result<()> {
        let published = project
            .published
            .clone()
            .ok_or(PortalError::NotPublished)?;

        self.transport
            .send(self.request(Method::DELETE, published))
            .await?
            .into_result()?;
        project.published = None;
        Ok(())
    }

    /// Server readiness for each of the user's project containers.
    pub async fn user_status(&self, user: &str) -> Result<UserStatus> {
        let url = self.config.portal(&format!("/rest/users/{user}/status/"));
        let response = self
            .transport
            .send(self.request(Method::GET, url))
            .await?
            .into_result()?;
        Ok(serde_json::from_str(&response.body)?)
    }
}
