//! Client for the wiki statistics catalog.
//!
//! The catalog front page links every project through a `display.php?t=`
//! anchor, and `api.php?action=dump` serves a per-project CSV dump whose
//! columns differ from project to project.

use reqwest::Url;
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::html::{Anchor, scan_anchors};
use crate::http::HttpFetcher;
use crate::tabular::{Table, TableRecord, parse_table};

/// Link prefix the front page uses for "display by table" project pages.
pub const PROJECT_LINK_PREFIX: &str = "display.php?t=";
/// Phrase the dump endpoint answers with for an unknown table name.
pub const UNKNOWN_TABLE_PHRASE: &str = "table name not set or unknown";

pub type ProjectRecord = TableRecord;
pub type ProjectDump = Table;

pub struct CatalogClient<'a> {
    fetcher: &'a dyn HttpFetcher,
    base_url: String,
}

impl<'a> CatalogClient<'a> {
    pub fn new(fetcher: &'a dyn HttpFetcher, base_url: &str) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Self { fetcher, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of every project linked from the catalog front page.
    pub fn list_projects(&self) -> Result<Vec<String>, DiscoveryError> {
        info!(catalog = %self.base_url, "retrieving project list");
        let projects = self
            .project_links()?
            .into_iter()
            .map(|anchor| anchor.text)
            .collect::<Vec<_>>();
        info!(count = projects.len(), "project list retrieved");
        Ok(projects)
    }

    /// Absolute URL of the detail page whose link text is exactly `project`.
    pub fn project_detail_url(&self, project: &str) -> Result<String, DiscoveryError> {
        let anchor = self
            .project_links()?
            .into_iter()
            .find(|anchor| anchor.text == project)
            .ok_or_else(|| DiscoveryError::ListingNotFound(project.to_string()))?;
        Ok(self.absolute(&anchor.href))
    }

    /// Raw HTML of a project's detail page.
    pub fn fetch_detail_page(&self, project: &str) -> Result<String, DiscoveryError> {
        let url = self.project_detail_url(project)?;
        debug!(project, url = %url, "fetching project detail page");
        self.fetch_document(&url)
    }

    /// Per-wiki metadata table for `project`.
    ///
    /// An unknown project is an error, never an empty table: a dump with zero
    /// rows means the project exists but lists no wikis.
    pub fn fetch_project_dump(&self, project: &str) -> Result<ProjectDump, DiscoveryError> {
        info!(project, "retrieving list of wikis");
        let url = self.dump_url(project)?;
        let page = self
            .fetcher
            .get_text(&url)
            .map_err(|error| DiscoveryError::unavailable(&url, error))?;
        if page.body.contains(UNKNOWN_TABLE_PHRASE) {
            return Err(DiscoveryError::ProjectNotFound(project.to_string()));
        }
        if !page.status.is_ok() {
            return Err(DiscoveryError::unavailable(
                &url,
                format!("HTTP {}", page.status.code),
            ));
        }
        let dump = parse_table(&page.body);
        info!(project, wikis = dump.len(), "wikis found");
        Ok(dump)
    }

    fn project_links(&self) -> Result<Vec<Anchor>, DiscoveryError> {
        let html = self.fetch_document(&self.base_url)?;
        Ok(scan_anchors(&html)
            .into_iter()
            .filter(|anchor| anchor.href.starts_with(PROJECT_LINK_PREFIX))
            .collect())
    }

    fn fetch_document(&self, url: &str) -> Result<String, DiscoveryError> {
        let page = self
            .fetcher
            .get_text(url)
            .map_err(|error| DiscoveryError::unavailable(url, error))?;
        if !page.status.is_ok() {
            return Err(DiscoveryError::unavailable(
                url,
                format!("HTTP {}", page.status.code),
            ));
        }
        Ok(page.body)
    }

    fn dump_url(&self, project: &str) -> Result<String, DiscoveryError> {
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join("api.php"))
            .map_err(|error| DiscoveryError::unavailable(&self.base_url, error))?;
        url.query_pairs_mut()
            .append_pair("action", "dump")
            .append_pair("table", project)
            .append_pair("format", "csv");
        Ok(url.to_string())
    }

    fn absolute(&self, href: &str) -> String {
        Url::parse(&self.base_url)
            .and_then(|base| base.join(href))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{href}", self.base_url))
    }
}
