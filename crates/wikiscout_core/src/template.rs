//! Expansion of project dumps into candidate wiki base URLs.
//!
//! Two strategies exist and the dump's columns pick one:
//!
//! - `prefix` column: a host template is inferred from a single exemplar
//!   link on the project's detail page and expanded once per prefix.
//! - `statsurl` column (and no `prefix`): each healthy row's stats URL host
//!   is used directly.
//!
//! Template inference is a heuristic. The exemplar host has its first
//! occurrence of the prefix replaced by a placeholder, so a prefix that also
//! appears elsewhere in the host (`de` in `de.wikide.org`) can produce a
//! wrong template. [`TemplateStrategy`] isolates that choice; [`ExemplarAnchor`]
//! takes the first match, [`PrefixedHostAnchor`] also requires the host to
//! contain the prefix.

use std::fmt;

use reqwest::Url;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogClient, ProjectDump, ProjectRecord};
use crate::error::DiscoveryError;
use crate::html::{Anchor, scan_anchors};

pub const TEMPLATE_PLACEHOLDER: &str = "{prefix}";

const COLUMN_LANG: &str = "lang";
const COLUMN_PREFIX: &str = "prefix";
const COLUMN_STATSURL: &str = "statsurl";
const COLUMN_HTTP: &str = "http";

/// A bare `scheme://host` hypothesised to serve a wiki.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CandidateUrl(String);

impl CandidateUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    pattern: String,
}

impl UrlTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn expand(&self, prefix: &str) -> CandidateUrl {
        CandidateUrl(self.pattern.replace(TEMPLATE_PLACEHOLDER, prefix))
    }
}

pub trait TemplateStrategy {
    /// Infer a host template from the detail page anchors and the known prefixes.
    fn derive(&self, anchors: &[Anchor], prefixes: &[&str]) -> Option<UrlTemplate>;
}

/// The first parseable anchor whose text equals a known prefix defines the template.
///
/// The exemplar's host is used even when it does not contain the prefix; the
/// resulting template then expands every prefix to that same host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExemplarAnchor;

impl TemplateStrategy for ExemplarAnchor {
    fn derive(&self, anchors: &[Anchor], prefixes: &[&str]) -> Option<UrlTemplate> {
        for anchor in anchors {
            if anchor.text.is_empty() || !prefixes.contains(&anchor.text.as_str()) {
                continue;
            }
            let Ok(url) = Url::parse(&anchor.href) else {
                continue;
            };
            let Some(host) = url.host_str() else {
                continue;
            };
            let templated = host.replacen(anchor.text.as_str(), TEMPLATE_PLACEHOLDER, 1);
            return Some(UrlTemplate::new(format!("http://{templated}")));
        }
        None
    }
}

/// Like [`ExemplarAnchor`], but skips anchors whose host does not contain the prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixedHostAnchor;

impl TemplateStrategy for PrefixedHostAnchor {
    fn derive(&self, anchors: &[Anchor], prefixes: &[&str]) -> Option<UrlTemplate> {
        let matching = anchors
            .iter()
            .filter(|anchor| {
                Url::parse(&anchor.href).is_ok_and(|url| {
                    url.host_str()
                        .is_some_and(|host| host.contains(anchor.text.as_str()))
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        ExemplarAnchor.derive(&matching, prefixes)
    }
}

pub struct TemplateResolver<'c, 'f, S = ExemplarAnchor> {
    catalog: &'c CatalogClient<'f>,
    strategy: S,
}

impl<'c, 'f> TemplateResolver<'c, 'f, ExemplarAnchor> {
    pub fn new(catalog: &'c CatalogClient<'f>) -> Self {
        Self {
            catalog,
            strategy: ExemplarAnchor,
        }
    }
}

impl<'c, 'f, S: TemplateStrategy> TemplateResolver<'c, 'f, S> {
    pub fn with_strategy(catalog: &'c CatalogClient<'f>, strategy: S) -> Self {
        Self { catalog, strategy }
    }

    /// Candidate base URLs for every wiki of `project` in `language` (or with no language).
    pub fn resolve(
        &self,
        project: &str,
        dump: &ProjectDump,
        language: &str,
    ) -> Result<Vec<CandidateUrl>, DiscoveryError> {
        let records = filter_by_language(dump, language);
        info!(project, wikis = records.len(), "attempting to retrieve wiki urls");

        let candidates = if dump.has_column(COLUMN_PREFIX) {
            let detail = self.catalog.fetch_detail_page(project)?;
            let anchors = scan_anchors(&detail);
            expand_prefixes(&self.strategy, &anchors, &records)
        } else if dump.has_column(COLUMN_STATSURL) {
            status_url_candidates(&records)
        } else {
            warn!(project, "dump has neither prefix nor statsurl columns");
            Vec::new()
        };

        info!(project, candidates = candidates.len(), "wiki links found");
        Ok(candidates)
    }
}

/// Records whose `lang` is `language` or empty; all records when the dump has no `lang` column.
pub fn filter_by_language<'d>(dump: &'d ProjectDump, language: &str) -> Vec<&'d ProjectRecord> {
    if !dump.has_column(COLUMN_LANG) {
        info!("no languages specified in retrieved records; restrictions ignored");
        return dump.records.iter().collect();
    }
    let records = dump
        .records
        .iter()
        .filter(|record| {
            let lang = record.value(COLUMN_LANG);
            lang == language || lang.is_empty()
        })
        .collect::<Vec<_>>();
    info!(
        wikis = records.len(),
        language, "wikis either in language or unspecified"
    );
    records
}

pub fn expand_prefixes(
    strategy: &impl TemplateStrategy,
    anchors: &[Anchor],
    records: &[&ProjectRecord],
) -> Vec<CandidateUrl> {
    let prefixes = records
        .iter()
        .map(|record| record.value(COLUMN_PREFIX))
        .filter(|prefix| !prefix.is_empty())
        .collect::<Vec<_>>();
    let Some(template) = strategy.derive(anchors, &prefixes) else {
        warn!(
            prefixes = prefixes.len(),
            "no detail page link matches a known prefix; cannot infer url template"
        );
        return Vec::new();
    };
    info!(template = template.pattern(), "inferred url template");
    prefixes
        .into_iter()
        .map(|prefix| template.expand(prefix))
        .collect()
}

/// `http://{host}` for every record whose stats endpoint last answered 200 or 404.
///
/// 404 is accepted because some wikis report it at their stats URL while the
/// wiki itself is still reachable.
pub fn status_url_candidates(records: &[&ProjectRecord]) -> Vec<CandidateUrl> {
    records
        .iter()
        .filter(|record| {
            matches!(
                record.value(COLUMN_HTTP).trim().parse::<i64>(),
                Ok(200) | Ok(404)
            )
        })
        .filter_map(|record| {
            let url = Url::parse(record.value(COLUMN_STATSURL)).ok()?;
            let host = url.host_str()?;
            Some(CandidateUrl(format!("http://{host}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        CandidateUrl, ExemplarAnchor, PrefixedHostAnchor, TemplateResolver, TemplateStrategy,
        UrlTemplate, filter_by_language, status_url_candidates,
    };
    use crate::catalog::CatalogClient;
    use crate::error::DiscoveryError;
    use crate::html::Anchor;
    use crate::http::stub::ScriptedFetcher;
    use crate::tabular::parse_table;

    const BASE: &str = "https://stats.example.org/";

    fn anchor(href: &str, text: &str) -> Anchor {
        Anchor {
            href: href.to_string(),
            text: text.to_string(),
        }
    }

    fn candidates(values: &[&str]) -> Vec<CandidateUrl> {
        values.iter().map(|value| CandidateUrl::new(*value)).collect()
    }

    #[test]
    fn language_filter_keeps_matching_and_unspecified_rows() {
        let dump = parse_table("prefix,lang\nen,en\nde,de\nxx,\n");
        let kept = filter_by_language(&dump, "en")
            .iter()
            .map(|record| record.value("prefix"))
            .collect::<Vec<_>>();
        assert_eq!(kept, vec!["en", "xx"]);
    }

    #[test]
    fn language_filter_is_skipped_without_lang_column() {
        let dump = parse_table("prefix\nen\nde\n");
        assert_eq!(filter_by_language(&dump, "fr").len(), 2);
    }

    #[test]
    fn exemplar_strategy_uses_first_matching_anchor() {
        let anchors = vec![
            anchor("display.php?t=x", "Home"),
            anchor("https://de.wikiquote.org/wiki/", "de"),
            anchor("https://en.other.org/", "en"),
        ];
        let template = ExemplarAnchor
            .derive(&anchors, &["en", "de"])
            .expect("template");
        assert_eq!(template, UrlTemplate::new("http://{prefix}.wikiquote.org"));
        assert_eq!(
            template.expand("fr"),
            CandidateUrl::new("http://fr.wikiquote.org")
        );
    }

    #[test]
    fn exemplar_strategy_replaces_only_the_first_occurrence() {
        let anchors = vec![anchor("https://de.wikide.org/", "de")];
        let template = ExemplarAnchor.derive(&anchors, &["de"]).expect("template");
        assert_eq!(template.pattern(), "http://{prefix}.wikide.org");
    }

    #[test]
    fn exemplar_strategy_takes_first_parseable_anchor() {
        let anchors = vec![
            anchor("/wiki/en", "en"),
            anchor("https://stats.other.org/en", "en"),
            anchor("https://en.wikiquote.org/", "en"),
        ];
        let template = ExemplarAnchor.derive(&anchors, &["en"]).expect("template");
        assert_eq!(template.pattern(), "http://stats.other.org");
        assert!(ExemplarAnchor.derive(&anchors[..1], &["en"]).is_none());
    }

    #[test]
    fn prefixed_host_strategy_skips_hosts_without_the_prefix() {
        let anchors = vec![
            anchor("https://stats.other.org/en", "en"),
            anchor("https://en.wikiquote.org/", "en"),
        ];
        let template = PrefixedHostAnchor
            .derive(&anchors, &["en"])
            .expect("template");
        assert_eq!(template.pattern(), "http://{prefix}.wikiquote.org");
        assert!(PrefixedHostAnchor.derive(&anchors[..1], &["en"]).is_none());
    }

    #[test]
    fn status_url_strategy_accepts_200_and_404_only() {
        let dump = parse_table(
            "statsurl,http\n\
             https://a.example.org/w/api.php?action=query,200\n\
             https://b.example.org/api.php,404\n\
             https://c.example.org/api.php,500\n\
             https://d.example.org/api.php,n/a\n\
             not a url,200\n",
        );
        let records = dump.records.iter().collect::<Vec<_>>();
        assert_eq!(
            status_url_candidates(&records),
            candidates(&["http://a.example.org", "http://b.example.org"])
        );
    }

    #[test]
    fn resolve_correlates_dump_prefixes_with_detail_page() {
        let fetcher = ScriptedFetcher::new()
            .page(
                BASE,
                r#"<a href="display.php?t=wikiquotes">wikiquotes</a>"#,
            )
            .page(
                "https://stats.example.org/display.php?t=wikiquotes",
                r#"<table><tr><td><a href="https://en.wikiquote.org/wiki/">en</a></td></tr></table>"#,
            );
        let catalog = CatalogClient::new(&fetcher, BASE);
        let resolver = TemplateResolver::new(&catalog);
        let dump = parse_table("prefix,lang\nen,en\nde,de\nsimple,\n");

        let resolved = resolver.resolve("wikiquotes", &dump, "en").expect("resolve");
        assert_eq!(
            resolved,
            candidates(&["http://en.wikiquote.org", "http://simple.wikiquote.org"])
        );
    }

    #[test]
    fn resolve_without_known_columns_yields_nothing() {
        let fetcher = ScriptedFetcher::new();
        let catalog = CatalogClient::new(&fetcher, BASE);
        let resolver = TemplateResolver::new(&catalog);
        let dump = parse_table("id,name\n1,alpha\n");
        assert!(resolver.resolve("odd", &dump, "en").expect("resolve").is_empty());
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn resolve_uses_status_urls_without_fetching_pages() {
        let fetcher = ScriptedFetcher::new();
        let catalog = CatalogClient::new(&fetcher, BASE);
        let resolver = TemplateResolver::new(&catalog);
        let dump = parse_table("statsurl,http,lang\nhttps://a.org/api.php,200,en\n");
        assert_eq!(
            resolver.resolve("mediawikis", &dump, "en").expect("resolve"),
            candidates(&["http://a.org"])
        );
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn resolve_propagates_detail_page_failure() {
        let detail = "https://stats.example.org/display.php?t=wikiquotes";
        let front = r#"<a href="display.php?t=wikiquotes">wikiquotes</a>"#;
        let dump = parse_table("prefix,lang\nen,en\n");

        let refused = ScriptedFetcher::new().page(BASE, front).fail(detail);
        let catalog = CatalogClient::new(&refused, BASE);
        assert!(matches!(
            TemplateResolver::new(&catalog).resolve("wikiquotes", &dump, "en"),
            Err(DiscoveryError::SourceUnavailable { url, .. }) if url == detail
        ));

        let overloaded = ScriptedFetcher::new().page(BASE, front).status(detail, 503);
        let catalog = CatalogClient::new(&overloaded, BASE);
        assert!(matches!(
            TemplateResolver::new(&catalog).resolve("wikiquotes", &dump, "en"),
            Err(DiscoveryError::SourceUnavailable { reason, .. }) if reason == "HTTP 503"
        ));
    }

    #[test]
    fn resolve_reports_missing_listing_link() {
        let fetcher = ScriptedFetcher::new().page(
            BASE,
            r#"<a href="display.php?t=wikipedias">wikipedias</a>"#,
        );
        let catalog = CatalogClient::new(&fetcher, BASE);
        let dump = parse_table("prefix\nen\n");
        assert!(matches!(
            TemplateResolver::new(&catalog).resolve("wikiquotes", &dump, "en"),
            Err(DiscoveryError::ListingNotFound(name)) if name == "wikiquotes"
        ));
        assert_eq!(fetcher.call_count(BASE), 1);
    }

    #[test]
    fn resolve_fails_when_front_page_is_unreachable() {
        let fetcher = ScriptedFetcher::new().fail(BASE);
        let catalog = CatalogClient::new(&fetcher, BASE);
        let dump = parse_table("prefix\nen\n");
        assert!(matches!(
            TemplateResolver::new(&catalog).resolve("wikiquotes", &dump, "en"),
            Err(DiscoveryError::SourceUnavailable { .. })
        ));
    }
}
