use serde::Serialize;
use tracing::info_span;

use crate::catalog::CatalogClient;
use crate::error::DiscoveryError;
use crate::template::{CandidateUrl, TemplateResolver, TemplateStrategy};
use crate::verify::{EndpointVerifier, VerificationReport};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub project: String,
    pub language: String,
    pub wikis_in_dump: usize,
    pub candidates: Vec<CandidateUrl>,
    pub verification: VerificationReport,
}

impl DiscoveryReport {
    pub fn endpoint_urls(&self) -> Vec<String> {
        self.verification.endpoint_urls()
    }
}

/// Dump, resolve and verify every wiki of `project` in `language`.
pub fn discover_project(
    catalog: &CatalogClient<'_>,
    verifier: &EndpointVerifier<'_>,
    project: &str,
    language: &str,
) -> Result<DiscoveryReport, DiscoveryError> {
    discover_project_with(
        &TemplateResolver::new(catalog),
        catalog,
        verifier,
        project,
        language,
    )
}

pub fn discover_project_with<S: TemplateStrategy>(
    resolver: &TemplateResolver<'_, '_, S>,
    catalog: &CatalogClient<'_>,
    verifier: &EndpointVerifier<'_>,
    project: &str,
    language: &str,
) -> Result<DiscoveryReport, DiscoveryError> {
    let _span = info_span!("discover", project, language).entered();
    let dump = catalog.fetch_project_dump(project)?;
    let candidates = resolver.resolve(project, &dump, language)?;
    let verification = verifier.verify(&candidates);
    Ok(DiscoveryReport {
        project: project.to_string(),
        language: language.to_string(),
        wikis_in_dump: dump.len(),
        candidates,
        verification,
    })
}
