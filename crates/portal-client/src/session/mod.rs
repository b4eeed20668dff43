//! Session-scoped resource cache.
//!
//! One [`SessionCache`] per client session holds a memoized slot for each
//! resource kind the pages read. Derived slots (tags, pinned tags, module
//! categories) fetch their primary resource through its public accessor, so
//! they are coherent with the primary at first derivation but are *not*
//! invalidated when the primary is later force-refreshed. Callers that need
//! freshness force-refresh the derived slot too; this staleness window is a
//! documented property, not a defect.

mod envelope;
mod models;

pub use models::{
    ModuleCatalog, ModuleCategory, ModuleSummary, NotebookSummary, Tag, WorkspaceEntry,
    normalize_tags,
};

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheSlot;
use crate::config::ServerConfig;
use crate::error::{PortalError, Result};
use crate::projects::Project;
use crate::transport::{ApiRequest, CONTENT_TYPE_JSON, Transport};

pub struct SessionCache {
    transport: Arc<dyn Transport>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
    notebooks: CacheSlot<Vec<NotebookSummary>>,
    tags: CacheSlot<Vec<Tag>>,
    pinned: CacheSlot<Vec<Tag>>,
    shared: CacheSlot<Vec<NotebookSummary>>,
    projects: CacheSlot<Vec<Project>>,
    workspace: CacheSlot<Vec<WorkspaceEntry>>,
    catalog: CacheSlot<ModuleCatalog>,
    categories: CacheSlot<Vec<ModuleCategory>>,
}

impl SessionCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ServerConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            cancel,
            notebooks: CacheSlot::new("public_notebooks"),
            tags: CacheSlot::new("notebook_tags"),
            pinned: CacheSlot::new("pinned_tags"),
            shared: CacheSlot::new("shared_notebooks"),
            projects: CacheSlot::new("notebook_projects"),
            workspace: CacheSlot::new("workspace_notebooks"),
            catalog: CacheSlot::new("module_catalog"),
            categories: CacheSlot::new("module_categories"),
        }
    }

    async fn fetch_json(&self, request: ApiRequest) -> Result<serde_json::Value> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PortalError::Cancelled),
            response = self.transport.send(request) => response?.into_result()?.json(),
        }
    }

    /// Public notebooks from the hosting service.
    pub async fn public_notebooks(&self, force: bool) -> Result<Arc<Vec<NotebookSummary>>> {
        self.notebooks
            .get_with(force, || async {
                let value = self
                    .fetch_json(ApiRequest::get(self.config.portal("/rest/notebooks/")))
                    .await?;
                envelope::notebooks(value)
            })
            .await
    }

    /// All notebook tags, derived from the public notebook listing:
    /// flattened and deduplicated by label, first occurrence wins.
    pub async fn notebook_tags(&self, force: bool) -> Result<Arc<Vec<Tag>>> {
        self.tags
            .get_with(force, || async {
                let notebooks = self.public_notebooks(false).await?;
                let mut seen = FxHashSet::default();
                let mut tags = Vec::new();
                for notebook in notebooks.iter() {
                    for tag in &notebook.tags {
                        if seen.insert(tag.label.clone()) {
                            tags.push(tag.clone());
                        }
                    }
                }
                Ok(tags)
            })
            .await
    }

    /// Tags flagged as pinned, derived from the tag listing.
    pub async fn pinned_tags(&self, force: bool) -> Result<Arc<Vec<Tag>>> {
        self.pinned
            .get_with(force, || async {
                let tags = self.notebook_tags(false).await?;
                Ok(tags.iter().filter(|tag| tag.pinned).cloned().collect())
            })
            .await
    }

    /// Notebooks shared with the current user.
    pub async fn shared_notebooks(&self, force: bool) -> Result<Arc<Vec<NotebookSummary>>> {
        self.shared
            .get_with(force, || async {
                let value = self
                    .fetch_json(ApiRequest::get(
                        self.config.hub("services/sharing/sharing/"),
                    ))
                    .await?;
                envelope::shared_notebooks(value)
            })
            .await
    }

    /// The user's notebook projects (workspace listing of the portal API).
    pub async fn notebook_projects(&self, force: bool) -> Result<Arc<Vec<Project>>> {
        self.projects
            .get_with(force, || async {
                let value = self
                    .fetch_json(ApiRequest::get(self.config.portal("/rest/projects/")))
                    .await?;
                envelope::projects(value)
            })
            .await
    }

    /// Files in the top-level user directory on the hub.
    pub async fn workspace_notebooks(&self, force: bool) -> Result<Arc<Vec<WorkspaceEntry>>> {
        self.workspace
            .get_with(force, || async {
                let value = self
                    .fetch_json(ApiRequest::get(
                        self.config.hub("user-redirect/api/contents"),
                    ))
                    .await?;
                envelope::workspace(value)
            })
            .await
    }

    /// The module catalog of the computation server; primary slot for the
    /// derived category listing.
    pub async fn module_catalog(&self, force: bool) -> Result<Arc<ModuleCatalog>> {
        self.catalog
            .get_with(force, || async {
                let value = self
                    .fetch_json(
                        ApiRequest::get(self.config.genepattern("rest/v1/tasks/all.json"))
                            .header(CONTENT_TYPE_JSON.0, CONTENT_TYPE_JSON.1),
                    )
                    .await?;
                envelope::module_catalog(value)
            })
            .await
    }

    /// Module categories, derived from the catalog through its public
    /// accessor.
    pub async fn module_categories(&self, force: bool) -> Result<Arc<Vec<ModuleCategory>>> {
        self.categories
            .get_with(force, || async {
                let catalog = self.module_catalog(false).await?;
                Ok(catalog.all_categories.clone())
            })
            .await
    }

    /// Current system status banner of the computation server. Not cached;
    /// fetched once per dashboard load.
    pub async fn system_message(&self) -> Result<String> {
        let request = ApiRequest::get(self.config.genepattern("rest/v1/config/system-message"));
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PortalError::Cancelled),
            response = self.transport.send(request) => response?.into_result()?,
        };
        Ok(response.body)
    }
}
