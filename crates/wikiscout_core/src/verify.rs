//! Concurrent verification of candidate wiki hosts.
//!
//! Each candidate walks a fixed fallback chain:
//!
//! 1. reachability: GET the URL as given, then once more with `http://`
//!    rewritten to `https://`; the first 200 wins, otherwise the candidate
//!    is abandoned. The base carried forward is the scheme and host the
//!    request finally landed on, so an `http://` host that redirects to
//!    `https://` is recorded under `https://`;
//! 2. API discovery: GET `/api.php`, `/w/api.php`, `/wiki/api.php` on the
//!    reachable base, stopping at the first 200.
//!
//! A transport error at any step ends that candidate's chain and is recorded
//! in its outcome; it never reaches sibling probes or the caller.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::http::HttpFetcher;
use crate::template::CandidateUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiSuffix {
    #[serde(rename = "/api.php")]
    Api,
    #[serde(rename = "/w/api.php")]
    WApi,
    #[serde(rename = "/wiki/api.php")]
    WikiApi,
}

impl ApiSuffix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "/api.php",
            Self::WApi => "/w/api.php",
            Self::WikiApi => "/wiki/api.php",
        }
    }
}

/// API paths tried, in order, once a candidate is reachable.
pub const API_CHAIN: [ApiSuffix; 3] = [ApiSuffix::Api, ApiSuffix::WApi, ApiSuffix::WikiApi];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityStep {
    AsGiven,
    HttpsUpgrade,
}

impl ReachabilityStep {
    /// URL this step requests for `candidate`, or `None` when the step does not apply.
    pub fn target(self, candidate: &str) -> Option<String> {
        match self {
            Self::AsGiven => Some(candidate.to_string()),
            Self::HttpsUpgrade => candidate
                .strip_prefix("http://")
                .map(|rest| format!("https://{rest}")),
        }
    }
}

pub const REACHABILITY_CHAIN: [ReachabilityStep; 2] =
    [ReachabilityStep::AsGiven, ReachabilityStep::HttpsUpgrade];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedEndpoint {
    /// Reachable base URL, after any scheme upgrade or redirect.
    pub base: String,
    pub suffix: ApiSuffix,
}

impl VerifiedEndpoint {
    pub fn url(&self) -> String {
        format!("{}{}", self.base, self.suffix.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Verified(VerifiedEndpoint),
    /// No reachability step answered 200; `status` is the last one seen.
    Unreachable { url: String, status: u16 },
    /// Reachable, but no API path answered 200.
    NoApi { base: String },
    /// A request could not be completed at all.
    Failed { url: String, error: String },
}

impl ProbeOutcome {
    pub fn endpoint(&self) -> Option<&VerifiedEndpoint> {
        match self {
            Self::Verified(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub candidate: CandidateUrl,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub probes: Vec<ProbeReport>,
}

impl VerificationReport {
    pub fn endpoints(&self) -> impl Iterator<Item = &VerifiedEndpoint> {
        self.probes.iter().filter_map(|probe| probe.outcome.endpoint())
    }

    pub fn endpoint_urls(&self) -> Vec<String> {
        self.endpoints().map(VerifiedEndpoint::url).collect()
    }

    pub fn verified_count(&self) -> usize {
        self.endpoints().count()
    }
}

/// Run the full fallback chain for one candidate.
pub fn probe_candidate(fetcher: &dyn HttpFetcher, candidate: &CandidateUrl) -> ProbeOutcome {
    let mut base = None::<String>;
    let mut last = (candidate.as_str().to_string(), 0u16);
    for step in REACHABILITY_CHAIN {
        let Some(url) = step.target(candidate.as_str()) else {
            continue;
        };
        match fetcher.get_status(&url) {
            Ok(status) if status.is_ok() => {
                let resolved = status.final_base().unwrap_or_else(|| url.clone());
                if resolved != url {
                    debug!(url = %url, resolved = %resolved, "candidate redirected");
                }
                base = Some(resolved);
                break;
            }
            Ok(status) => {
                debug!(url = %url, status = status.code, ?step, "candidate not reachable");
                last = (url, status.code);
            }
            Err(error) => {
                warn!(url = %url, %error, "could not establish a proper connection to host");
                return ProbeOutcome::Failed {
                    url,
                    error: error.to_string(),
                };
            }
        }
    }
    let Some(base) = base else {
        info!(url = %last.0, status = last.1, "candidate returned non-200; skipping");
        return ProbeOutcome::Unreachable {
            url: last.0,
            status: last.1,
        };
    };

    for (attempt, suffix) in API_CHAIN.into_iter().enumerate() {
        let url = format!("{base}{}", suffix.as_str());
        debug!(attempt = attempt + 1, url = %url, "pinging api path");
        match fetcher.get_status(&url) {
            Ok(status) if status.is_ok() => {
                info!(endpoint = %url, "endpoint verified");
                return ProbeOutcome::Verified(VerifiedEndpoint { base, suffix });
            }
            Ok(_) => {}
            Err(error) => {
                warn!(url = %url, %error, "could not establish a proper connection to host");
                return ProbeOutcome::Failed {
                    url,
                    error: error.to_string(),
                };
            }
        }
    }
    info!(base = %base, "endpoint could not be found");
    ProbeOutcome::NoApi { base }
}

pub struct EndpointVerifier<'a> {
    fetcher: &'a dyn HttpFetcher,
    concurrency: usize,
}

impl<'a> EndpointVerifier<'a> {
    pub fn new(fetcher: &'a dyn HttpFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Probe every candidate concurrently and return once all of them finished.
    ///
    /// `probes[i]` always describes `candidates[i]`.
    pub fn verify(&self, candidates: &[CandidateUrl]) -> VerificationReport {
        if candidates.is_empty() {
            return VerificationReport::default();
        }
        info!(candidates = candidates.len(), "verifying endpoints");

        let probe = |candidate: &CandidateUrl| {
            let _span = info_span!("probe", candidate = %candidate).entered();
            ProbeReport {
                candidate: candidate.clone(),
                outcome: probe_candidate(self.fetcher, candidate),
            }
        };
        let probes = match ThreadPoolBuilder::new()
            .num_threads(self.concurrency.min(candidates.len()))
            .thread_name(|index| format!("wikiscout-probe-{index}"))
            .build()
        {
            Ok(pool) => pool.install(|| candidates.par_iter().map(probe).collect::<Vec<_>>()),
            Err(error) => {
                warn!(%error, "failed to start probe pool; probing sequentially");
                candidates.iter().map(probe).collect()
            }
        };

        let report = VerificationReport { probes };
        info!(
            verified = report.verified_count(),
            "endpoints verified successfully"
        );
        report
    }
}
