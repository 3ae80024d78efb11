//! Flat-file registry of verified wiki API endpoints.
//!
//! The file is a four-column table (`referenceid,endpoint,resolverid,displaycolor`)
//! that operators may edit by hand. Loading never repairs it: rows sharing a
//! reference id are dropped and reported, malformed colors are replaced in
//! memory only, and rows whose reference id is `!disabled` stay on disk but are
//! never part of the active set. Merging rewrites the whole file through a
//! temporary sibling so readers never observe a half-written registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::color::{RANDOM_COLOR_MARKER, ResolvedColor, Rgb};
use crate::error::RegistryError;
use crate::tabular::{parse_table, render_row};

pub const DISABLED_REFERENCE_ID: &str = "!disabled";
pub const GENERIC_RESOLVER_ID: &str = "generic";

const COLUMN_REFERENCE_ID: &str = "referenceid";
const COLUMN_ENDPOINT: &str = "endpoint";
const COLUMN_RESOLVER_ID: &str = "resolverid";
const COLUMN_DISPLAY_COLOR: &str = "displaycolor";
const REGISTRY_COLUMNS: [&str; 4] = [
    COLUMN_REFERENCE_ID,
    COLUMN_ENDPOINT,
    COLUMN_RESOLVER_ID,
    COLUMN_DISPLAY_COLOR,
];

/// An active registry entry with its display color resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiEndpoint {
    pub reference_id: String,
    pub endpoint_url: String,
    pub resolver_id: String,
    pub display_color: Rgb,
}

/// A registry row exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryRow {
    pub reference_id: String,
    pub endpoint: String,
    pub resolver_id: String,
    pub display_color: String,
}

impl RegistryRow {
    pub fn is_disabled(&self) -> bool {
        self.reference_id == DISABLED_REFERENCE_ID
    }

    fn render(&self) -> String {
        render_row(&[
            &self.reference_id,
            &self.endpoint,
            &self.resolver_id,
            &self.display_color,
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryLoad {
    pub endpoints: Vec<WikiEndpoint>,
    pub disabled_rows: usize,
    /// Reference ids shared by more than one enabled row; all such rows are dropped.
    pub duplicate_ids: Vec<String>,
    pub dropped_rows: usize,
    /// Reference ids whose stored color could not be parsed.
    pub malformed_colors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub previous_rows: usize,
    pub added: Vec<RegistryRow>,
    pub already_present: usize,
    pub invalid: Vec<String>,
    /// Newly generated reference ids that collide with an enabled row.
    pub colliding_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the active endpoint set, creating an empty registry first if none exists.
    pub fn load(&self) -> Result<RegistryLoad, RegistryError> {
        info!(path = %self.path.display(), "loading endpoints from registry");
        self.ensure_exists()?;
        let rows = self.read_rows()?;

        let mut occurrences = HashMap::<&str, usize>::new();
        for row in rows.iter().filter(|row| !row.is_disabled()) {
            *occurrences.entry(row.reference_id.as_str()).or_default() += 1;
        }

        let mut report = RegistryLoad::default();
        let mut duplicate_ids = BTreeSet::new();
        for row in &rows {
            if row.is_disabled() {
                report.disabled_rows += 1;
                continue;
            }
            if occurrences.get(row.reference_id.as_str()).copied() != Some(1) {
                duplicate_ids.insert(row.reference_id.clone());
                report.dropped_rows += 1;
                continue;
            }
            let resolved = ResolvedColor::resolve(&row.display_color);
            if let ResolvedColor::Malformed(_) = resolved {
                warn!(
                    reference_id = %row.reference_id,
                    value = %row.display_color,
                    "display color is in an unrecognized format; using a random color"
                );
                report.malformed_colors.push(row.reference_id.clone());
            }
            report.endpoints.push(WikiEndpoint {
                reference_id: row.reference_id.clone(),
                endpoint_url: row.endpoint.clone(),
                resolver_id: row.resolver_id.clone(),
                display_color: resolved.rgb(),
            });
        }
        report.duplicate_ids = duplicate_ids.into_iter().collect();

        if !report.duplicate_ids.is_empty() {
            warn!(
                ids = report.duplicate_ids.len(),
                rows = report.dropped_rows,
                "endpoints have repeating reference ids and were ignored"
            );
        }
        info!(
            loaded = report.endpoints.len(),
            disabled = report.disabled_rows,
            "endpoints loaded"
        );
        Ok(report)
    }

    /// Append endpoint URLs not yet stored, rewriting the registry atomically.
    ///
    /// New rows get the `generic` resolver and a `!random` color. Their
    /// reference id is the host's leading label when `auto_enable` is set and
    /// the host has more than one dot; otherwise the row is stored disabled.
    pub fn merge(&self, urls: &[String], auto_enable: bool) -> Result<MergeReport, RegistryError> {
        info!(path = %self.path.display(), incoming = urls.len(), "merging endpoints into registry");
        self.ensure_exists()?;
        let previous = self.read_rows()?;

        let stored = previous
            .iter()
            .map(|row| row.endpoint.as_str())
            .collect::<HashSet<_>>();
        let mut enabled_ids = previous
            .iter()
            .filter(|row| !row.is_disabled())
            .map(|row| row.reference_id.clone())
            .collect::<HashSet<_>>();

        let mut report = MergeReport {
            previous_rows: previous.len(),
            ..MergeReport::default()
        };
        let mut seen = HashSet::new();
        for url in urls {
            if stored.contains(url.as_str()) || !seen.insert(url.as_str()) {
                report.already_present += 1;
                continue;
            }
            let Some(host) = Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.host_str().map(ToString::to_string))
            else {
                warn!(url = %url, "skipping malformed endpoint url");
                report.invalid.push(url.clone());
                continue;
            };
            let reference_id = derive_reference_id(&host, auto_enable);
            if reference_id != DISABLED_REFERENCE_ID && !enabled_ids.insert(reference_id.clone()) {
                warn!(reference_id = %reference_id, url = %url, "generated reference id is already in use");
                report.colliding_ids.push(reference_id.clone());
            }
            report.added.push(RegistryRow {
                reference_id,
                endpoint: url.clone(),
                resolver_id: GENERIC_RESOLVER_ID.to_string(),
                display_color: RANDOM_COLOR_MARKER.to_string(),
            });
        }

        info!(
            previous = report.previous_rows,
            added = report.added.len(),
            "previous entries found; new endpoints will be added"
        );
        self.write_rows(previous.iter().chain(report.added.iter()))?;
        Ok(report)
    }

    fn ensure_exists(&self) -> Result<(), RegistryError> {
        if self.path.exists() {
            return Ok(());
        }
        self.write_rows(std::iter::empty())
    }

    fn read_rows(&self) -> Result<Vec<RegistryRow>, RegistryError> {
        let content = fs::read_to_string(&self.path).map_err(|source| RegistryError::Read {
            path: self.path.clone(),
            source,
        })?;
        let table = parse_table(&content);
        if table.headers.is_empty() {
            return Ok(Vec::new());
        }
        for column in REGISTRY_COLUMNS {
            if !table.has_column(column) {
                return Err(RegistryError::MissingColumn {
                    path: self.path.clone(),
                    column,
                });
            }
        }
        Ok(table
            .records
            .iter()
            .map(|record| RegistryRow {
                reference_id: record.value(COLUMN_REFERENCE_ID).to_string(),
                endpoint: record.value(COLUMN_ENDPOINT).to_string(),
                resolver_id: record.value(COLUMN_RESOLVER_ID).to_string(),
                display_color: record.value(COLUMN_DISPLAY_COLOR).to_string(),
            })
            .collect())
    }

    fn write_rows<'a>(
        &self,
        rows: impl Iterator<Item = &'a RegistryRow>,
    ) -> Result<(), RegistryError> {
        let parent = match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => return Err(RegistryError::NoParent(self.path.clone())),
        };
        let write_error = |source| RegistryError::Write {
            path: self.path.clone(),
            source,
        };
        fs::create_dir_all(parent).map_err(write_error)?;

        let mut content = render_row(&REGISTRY_COLUMNS);
        for row in rows {
            content.push_str(&row.render());
        }
        let mut temp = NamedTempFile::new_in(parent).map_err(write_error)?;
        temp.write_all(content.as_bytes()).map_err(write_error)?;
        temp.flush().map_err(write_error)?;
        temp.persist(&self.path)
            .map_err(|error| write_error(error.error))?;
        Ok(())
    }
}

/// Reference id for a newly merged endpoint on `host`.
pub fn derive_reference_id(host: &str, auto_enable: bool) -> String {
    let dots = host.matches('.').count();
    match host.split_once('.') {
        Some((label, _)) if dots > 1 && auto_enable => label.to_string(),
        _ => DISABLED_REFERENCE_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{DISABLED_REFERENCE_ID, RegistryStore, derive_reference_id};
    use crate::color::Rgb;
    use crate::error::RegistryError;

    const HEADER: &str = "referenceid,endpoint,resolverid,displaycolor\r\n";

    fn store_with(content: &str) -> (tempfile::TempDir, RegistryStore) {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("endpoints.csv");
        fs::write(&path, content).expect("seed registry");
        (temp, RegistryStore::new(path))
    }

    fn triples(store: &RegistryStore) -> Vec<(String, String, String)> {
        store
            .load()
            .expect("load")
            .endpoints
            .into_iter()
            .map(|endpoint| {
                (
                    endpoint.reference_id,
                    endpoint.endpoint_url,
                    endpoint.resolver_id,
                )
            })
            .collect()
    }

    #[test]
    fn load_bootstraps_missing_registry_with_header() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("endpoints.csv");
        let store = RegistryStore::new(&path);

        let report = store.load().expect("load");
        assert!(report.endpoints.is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read"), HEADER);

        store.load().expect("second load");
        assert_eq!(fs::read_to_string(&path).expect("read"), HEADER);
    }

    #[test]
    fn load_resolves_literal_and_random_colors() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             en,https://en.example.org/w/api.php,generic,#FF0000\n\
             de,https://de.example.org/w/api.php,generic,!random\n",
        );
        let report = store.load().expect("load");
        assert_eq!(report.endpoints.len(), 2);
        assert_eq!(report.endpoints[0].display_color, Rgb::new(255, 0, 0));
        assert!(report.malformed_colors.is_empty());
        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("!random"));
    }

    #[test]
    fn reload_yields_identical_triples() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             en,https://en.example.org/w/api.php,generic,!random\n\
             fr,https://fr.example.org/api.php,custom,teal\n\
             !disabled,https://x.example.org/api.php,generic,!random\n",
        );
        assert_eq!(triples(&store), triples(&store));
        assert_eq!(triples(&store).len(), 2);
    }

    #[test]
    fn duplicates_are_all_dropped_and_sentinels_never_active() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             en,https://en.one.org/api.php,generic,#000000\n\
             en,https://en.two.org/api.php,generic,#000000\n\
             !disabled,https://off.example.org/api.php,generic,#000000\n\
             !disabled,https://off2.example.org/api.php,generic,#000000\n\
             fr,https://fr.example.org/api.php,generic,#000000\n",
        );
        let report = store.load().expect("load");
        let ids = report
            .endpoints
            .iter()
            .map(|endpoint| endpoint.reference_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["fr"]);
        assert_eq!(report.duplicate_ids, vec!["en".to_string()]);
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(report.disabled_rows, 2);

        let raw = fs::read_to_string(store.path()).expect("read");
        assert_eq!(raw.lines().count(), 6);
    }

    #[test]
    fn malformed_color_is_reported_and_replaced() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             en,https://en.example.org/api.php,generic,sort-of-blue\n",
        );
        let report = store.load().expect("load");
        assert_eq!(report.endpoints.len(), 1);
        assert_eq!(report.malformed_colors, vec!["en".to_string()]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let (_temp, store) = store_with("referenceid,endpoint\nen,https://en.example.org\n");
        let error = store.load().expect_err("must fail");
        assert!(matches!(
            error,
            RegistryError::MissingColumn {
                column: "resolverid",
                ..
            }
        ));
    }

    #[test]
    fn merge_appends_new_rows_and_preserves_existing_verbatim() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             \"!disabled\",https://old.example.org/api.php,custom,\"#00FF00\"\n",
        );
        let report = store
            .merge(
                &[
                    "https://en.wikipedia.org/w/api.php".to_string(),
                    "https://wiki.example/api.php".to_string(),
                ],
                true,
            )
            .expect("merge");
        assert_eq!(report.previous_rows, 1);
        assert_eq!(report.added.len(), 2);

        let raw = fs::read_to_string(store.path()).expect("read");
        assert_eq!(
            raw,
            "referenceid,endpoint,resolverid,displaycolor\r\n\
             !disabled,https://old.example.org/api.php,custom,#00FF00\r\n\
             en,https://en.wikipedia.org/w/api.php,generic,!random\r\n\
             !disabled,https://wiki.example/api.php,generic,!random\r\n"
        );
    }

    #[test]
    fn merging_a_stored_url_is_a_noop() {
        let (_temp, store) = store_with(HEADER);
        let url = "https://en.example.org/w/api.php".to_string();
        store.merge(&[url.clone(), url.clone()], true).expect("first merge");
        let second = store.merge(&[url.clone()], true).expect("second merge");
        assert!(second.added.is_empty());
        assert_eq!(second.already_present, 1);

        let raw = fs::read_to_string(store.path()).expect("read");
        assert_eq!(raw.matches(url.as_str()).count(), 1);
    }

    #[test]
    fn merge_skips_malformed_urls_and_flags_collisions() {
        let (_temp, store) = store_with(
            "referenceid,endpoint,resolverid,displaycolor\n\
             en,https://en.one.org/api.php,generic,!random\n",
        );
        let report = store
            .merge(
                &[
                    "not a url".to_string(),
                    "https://en.two.org/api.php".to_string(),
                ],
                true,
            )
            .expect("merge");
        assert_eq!(report.invalid, vec!["not a url".to_string()]);
        assert_eq!(report.colliding_ids, vec!["en".to_string()]);
        assert_eq!(report.added.len(), 1);
    }

    #[test]
    fn merge_without_auto_enable_stores_disabled_rows() {
        let (_temp, store) = store_with(HEADER);
        let report = store
            .merge(&["https://en.wikipedia.org/w/api.php".to_string()], false)
            .expect("merge");
        assert_eq!(report.added[0].reference_id, DISABLED_REFERENCE_ID);
        assert!(store.load().expect("load").endpoints.is_empty());
    }

    #[test]
    fn reference_id_depends_on_dot_count_and_flag() {
        assert_eq!(derive_reference_id("en.wikipedia.org", true), "en");
        assert_eq!(derive_reference_id("a.b.c.d", true), "a");
        assert_eq!(
            derive_reference_id("en.wikipedia.org", false),
            DISABLED_REFERENCE_ID
        );
        assert_eq!(derive_reference_id("wiki.example", true), DISABLED_REFERENCE_ID);
        assert_eq!(derive_reference_id("localhost", true), DISABLED_REFERENCE_ID);
    }
}
