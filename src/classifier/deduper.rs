//! URL deduplication by canonical key

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::normalizer::{UrlError, UrlNormalizer, parse_url};

/// What two URLs must share to count as duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// Same normalized URL
    #[default]
    Exact,
    /// Same scheme, host, port and path; query ignored
    Path,
    /// Same path and same set of parameter names; values ignored
    Structure,
}

impl DedupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupStrategy::Exact => "exact",
            DedupStrategy::Path => "path",
            DedupStrategy::Structure => "structure",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(DedupStrategy::Exact),
            "path" => Some(DedupStrategy::Path),
            "structure" => Some(DedupStrategy::Structure),
            _ => None,
        }
    }
}

/// Drops URLs that collapse onto an already seen key
#[derive(Debug, Clone, Default)]
pub struct UrlDeduper {
    normalizer: UrlNormalizer,
    strategy: DedupStrategy,
}

impl UrlDeduper {
    pub fn new(strategy: DedupStrategy) -> Self {
        Self {
            normalizer: UrlNormalizer::new(),
            strategy,
        }
    }

    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// Keep the first URL for each key, in input order. Unparseable URLs are dropped.
    pub fn deduplicate(&self, urls: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for url in urls {
            match self.key(url) {
                Ok(key) => {
                    if seen.insert(key) {
                        unique.push(url.clone());
                    }
                }
                Err(e) => tracing::debug!("Dropping URL {:?} during dedup: {}", url, e),
            }
        }
        unique
    }

    /// Keys shared by more than one input URL, with every URL that produced them
    pub fn get_duplicates(&self, urls: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for url in urls {
            if let Ok(key) = self.key(url) {
                groups.entry(key).or_default().push(url.clone());
            }
        }
        groups.retain(|_, members| members.len() > 1);
        groups
    }

    fn key(&self, url: &str) -> Result<String, UrlError> {
        match self.strategy {
            DedupStrategy::Exact => self.normalizer.normalize(url),
            DedupStrategy::Path => self.normalizer.get_base_url(url),
            DedupStrategy::Structure => {
                let parsed = parse_url(url)?;
                let base = self.normalizer.get_base_url(url)?;
                let names: BTreeSet<String> =
                    parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
                if names.is_empty() {
                    Ok(base)
                } else {
                    let names: Vec<String> = names.into_iter().collect();
                    Ok(format!("{}?[{}]", base, names.join(",")))
                }
            }
        }
    }
}
