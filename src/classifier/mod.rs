//! Rule-based URL classification into vulnerability candidate groups
//!
//! URLs are normalized, matched against regex rules on parameter names,
//! parameter values, the path or the whole URL, and tagged with every group
//! whose rule matched. URLs with parameters that match no rule are tagged
//! `generic`. Static assets are never classified.

mod deduper;
mod normalizer;

pub use deduper::{DedupStrategy, UrlDeduper};
pub use normalizer::{UrlError, UrlNormalizer, parse_url};

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::ClassificationGroup;

/// File extensions that mark a URL as a static asset
pub const STATIC_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".pdf", ".doc", ".docx", ".xls",
    ".xlsx", ".css", ".js", ".woff", ".woff2", ".ttf", ".eot", ".mp3", ".mp4", ".avi", ".mov",
    ".webm", ".zip", ".tar", ".gz", ".rar",
];

/// Part of the URL a rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLocation {
    ParamName,
    ParamValue,
    Path,
    FullUrl,
}

/// One named rule: any pattern matching at `location` tags the URL with `group`
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    pub group: ClassificationGroup,
    pub location: MatchLocation,
    pub confidence: f64,
    pub description: String,
    patterns: Vec<Regex>,
}

impl ClassificationRule {
    /// Build a rule; patterns are compiled case-insensitive
    pub fn new(
        name: impl Into<String>,
        group: ClassificationGroup,
        location: MatchLocation,
        patterns: &[&str],
        confidence: f64,
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            group,
            location,
            confidence,
            description: String::new(),
            patterns,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn any_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Parameter names and values are tested one at a time
    fn matches(&self, normalized: &str, url: &Url, params: &[(String, String)]) -> bool {
        match self.location {
            MatchLocation::ParamName => params.iter().any(|(name, _)| self.any_match(name)),
            MatchLocation::ParamValue => params.iter().any(|(_, value)| self.any_match(value)),
            MatchLocation::Path => self.any_match(url.path()),
            MatchLocation::FullUrl => self.any_match(normalized),
        }
    }
}

/// Groups assigned to one URL; serialized as one JSONL record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The URL as given, not its normalized form
    pub url: String,
    pub groups: Vec<ClassificationGroup>,
    pub confidence: f64,
}

impl ClassificationResult {
    fn unclassified(url: &str) -> Self {
        Self {
            url: url.to_string(),
            groups: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn has_group(&self, group: ClassificationGroup) -> bool {
        self.groups.contains(&group)
    }
}

/// Counts over a batch of classified URLs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationStats {
    pub total_urls: usize,
    pub static_files: usize,
    pub classified_urls: usize,
    pub by_group: BTreeMap<ClassificationGroup, usize>,
}

pub struct UrlClassifier {
    normalizer: UrlNormalizer,
    deduper: UrlDeduper,
    rules: Vec<ClassificationRule>,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlClassifier {
    /// Classifier with the built-in rules and exact deduplication
    pub fn new() -> Self {
        Self::with_strategy(DedupStrategy::Exact)
    }

    pub fn with_strategy(strategy: DedupStrategy) -> Self {
        Self {
            normalizer: UrlNormalizer::new(),
            deduper: UrlDeduper::new(strategy),
            rules: default_rules(),
        }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    pub fn classify(&self, url: &str) -> ClassificationResult {
        if is_static_file(url) {
            return ClassificationResult::unclassified(url);
        }

        let (normalized, parsed) = match self
            .normalizer
            .normalize(url)
            .and_then(|n| Ok((n, parse_url(url)?)))
        {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!("Not classifying {:?}: {}", url, e);
                return ClassificationResult::unclassified(url);
            }
        };
        let params = self.normalizer.query_params(&parsed);

        let mut groups = Vec::new();
        let mut confidence: f64 = 0.0;
        for rule in &self.rules {
            if rule.matches(&normalized, &parsed, &params) {
                if !groups.contains(&rule.group) {
                    groups.push(rule.group);
                }
                confidence = confidence.max(rule.confidence);
            }
        }

        if groups.is_empty() && !params.is_empty() {
            groups.push(ClassificationGroup::Generic);
            confidence = 0.5;
        }
        groups.sort_by_key(|g| g.as_str());

        ClassificationResult {
            url: url.to_string(),
            groups,
            confidence,
        }
    }

    /// Drop duplicates under the configured strategy, keeping first occurrences
    pub fn deduplicate(&self, urls: &[String]) -> Vec<String> {
        self.deduper.deduplicate(urls)
    }

    pub fn classify_batch(&self, urls: &[String]) -> Vec<ClassificationResult> {
        urls.iter().map(|url| self.classify(url)).collect()
    }

    /// Map every group (empty ones included) to the URLs tagged with it
    pub fn classify_and_group(
        &self,
        urls: &[String],
    ) -> BTreeMap<ClassificationGroup, Vec<String>> {
        let mut grouped: BTreeMap<ClassificationGroup, Vec<String>> = ClassificationGroup::ALL
            .into_iter()
            .map(|g| (g, Vec::new()))
            .collect();
        for result in self.classify_batch(urls) {
            for group in &result.groups {
                grouped.entry(*group).or_default().push(result.url.clone());
            }
        }
        grouped
    }

    /// Deduplicate, classify, then deduplicate each group again
    pub fn classify_deduplicate_and_group(
        &self,
        urls: &[String],
    ) -> BTreeMap<ClassificationGroup, Vec<String>> {
        let unique = self.deduper.deduplicate(urls);
        let mut grouped = self.classify_and_group(&unique);
        for members in grouped.values_mut() {
            *members = self.deduper.deduplicate(members);
        }
        grouped
    }

    pub fn filter_static_files(&self, urls: &[String]) -> Vec<String> {
        urls.iter().filter(|u| !is_static_file(u)).cloned().collect()
    }

    pub fn statistics(&self, urls: &[String]) -> ClassificationStats {
        let mut stats = ClassificationStats {
            total_urls: urls.len(),
            by_group: ClassificationGroup::ALL.into_iter().map(|g| (g, 0)).collect(),
            ..Default::default()
        };
        for url in urls {
            if is_static_file(url) {
                stats.static_files += 1;
                continue;
            }
            let result = self.classify(url);
            if !result.groups.is_empty() {
                stats.classified_urls += 1;
            }
            for group in result.groups {
                *stats.by_group.entry(group).or_default() += 1;
            }
        }
        stats
    }
}

/// Whether the URL path ends in a static asset extension
pub fn is_static_file(url: &str) -> bool {
    let path = match parse_url(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_lowercase(),
    };
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn default_rules() -> Vec<ClassificationRule> {
    use ClassificationGroup::*;
    use MatchLocation::*;

    let specs: &[(&str, ClassificationGroup, MatchLocation, &[&str], f64, &str)] = &[
        (
            "xss_reflected_params",
            XssCandidates,
            ParamName,
            &[
                r"\b(q|query|search|keyword|term|s|text|message|msg|comment|content|data|input|name|value)\b",
                r"\b(title|subject|body|description|post|article|page|view)\b",
                r"\b(html|output|display|render|show)\b",
            ],
            0.9,
            "Parameters commonly reflected into the page",
        ),
        (
            "xss_callback_params",
            XssCandidates,
            ParamName,
            &[r"\b(callback|jsonp|cb|function|fn|method)\b"],
            0.95,
            "JSONP callback parameters",
        ),
        (
            "sqli_id_params",
            SqliCandidates,
            ParamName,
            &[
                r"\b(id|uid|user_?id|item_?id|product_?id|post_?id|article_?id|page_?id)\b",
                r"\b(pid|oid|cid|gid|mid|tid|rid)\b",
                r"\b(key|code|ref|reference)\b",
            ],
            0.85,
            "Identifier parameters likely used in queries",
        ),
        (
            "sqli_filter_params",
            SqliCandidates,
            ParamName,
            &[
                r"\b(filter|sort|order|orderby|sortby|groupby|where)\b",
                r"\b(category|cat|type|status|state|condition)\b",
                r"\b(limit|offset|page|per_?page|start|count)\b",
            ],
            0.8,
            "Filtering and ordering parameters",
        ),
        (
            "sqli_numeric_values",
            SqliCandidates,
            ParamValue,
            &[r"^\d+$"],
            0.7,
            "Purely numeric parameter values",
        ),
        (
            "redirect_url_params",
            RedirectCandidates,
            ParamName,
            &[
                r"\b(url|redirect|redir|return|returnto|return_?url|return_?to)\b",
                r"\b(goto|go|target|dest|destination|next|continue|forward)\b",
                r"\b(link|href|src|source|location|loc)\b",
            ],
            0.9,
            "Redirect target parameters",
        ),
        (
            "redirect_url_values",
            RedirectCandidates,
            ParamValue,
            &[r"^https?://", r"^//", r"^/\w+"],
            0.85,
            "Parameter values that look like URLs or paths",
        ),
        (
            "ssrf_url_params",
            SsrfCandidates,
            ParamName,
            &[
                r"\b(url|uri|path|file|document|doc|image|img|photo|pic)\b",
                r"\b(host|server|domain|site|website|endpoint|api|service)\b",
                r"\b(webhook|callback|ping|fetch|load|download|upload|proxy)\b",
                r"\b(link|href|src|source|target|dest|destination)\b",
            ],
            0.85,
            "Parameters naming a resource the server fetches",
        ),
        (
            "ssrf_api_paths",
            SsrfCandidates,
            Path,
            &[
                r"/api/.*/(fetch|proxy|image|file|download|upload)",
                r"/(webhook|callback|ping|health)",
            ],
            0.75,
            "API endpoints that fetch remote resources",
        ),
    ];

    specs
        .iter()
        .filter_map(|(name, group, location, patterns, confidence, description)| {
            match ClassificationRule::new(*name, *group, *location, patterns, *confidence) {
                Ok(rule) => Some(rule.with_description(*description)),
                Err(e) => {
                    tracing::warn!("Skipping classification rule {}: {}", name, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassificationGroup::*;

    fn urls(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_rules_compile() {
        assert_eq!(UrlClassifier::new().rules().len(), 9);
    }

    #[test]
    fn test_xss_and_sqli_tags() {
        let classifier = UrlClassifier::new();
        let result = classifier.classify("https://shop.example.com/search?q=shoes&id=42");
        assert_eq!(result.groups, vec![SqliCandidates, XssCandidates]);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.url, "https://shop.example.com/search?q=shoes&id=42");
    }

    #[test]
    fn test_callback_has_highest_confidence() {
        let result = UrlClassifier::new().classify("http://e.com/api?callback=foo");
        assert!(result.has_group(XssCandidates));
        assert!(result.has_group(SsrfCandidates));
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_redirect_by_value() {
        let result = UrlClassifier::new().classify("http://e.com/login?x=https://evil.com");
        assert_eq!(result.groups, vec![RedirectCandidates]);
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn test_ssrf_path_without_params() {
        let result = UrlClassifier::new().classify("http://e.com/api/v1/proxy");
        assert_eq!(result.groups, vec![SsrfCandidates]);
    }

    #[test]
    fn test_generic_and_unclassified() {
        let classifier = UrlClassifier::new();
        let generic = classifier.classify("http://e.com/x?zzz=abc");
        assert_eq!(generic.groups, vec![Generic]);
        assert_eq!(generic.confidence, 0.5);

        let plain = classifier.classify("http://e.com/about");
        assert!(plain.groups.is_empty());
        assert_eq!(plain.confidence, 0.0);
    }

    #[test]
    fn test_static_files_are_skipped() {
        let classifier = UrlClassifier::new();
        let result = classifier.classify("http://e.com/logo.PNG?id=1");
        assert!(result.groups.is_empty());
        assert!(!is_static_file("http://e.com/data.json?id=1"));
        assert_eq!(
            classifier.filter_static_files(&urls(&["http://e.com/a.css", "http://e.com/a?id=1"])),
            urls(&["http://e.com/a?id=1"])
        );
    }

    #[test]
    fn test_group_map_contains_every_group() {
        let classifier = UrlClassifier::new();
        let grouped = classifier.classify_deduplicate_and_group(&urls(&[
            "http://e.com/item?id=1",
            "HTTP://E.com/item?id=1",
            "http://e.com/item?id=2",
        ]));
        assert_eq!(grouped.len(), 5);
        assert_eq!(
            grouped[&SqliCandidates],
            urls(&["http://e.com/item?id=1", "http://e.com/item?id=2"])
        );
        assert!(grouped[&XssCandidates].is_empty());
    }

    #[test]
    fn test_structure_dedup_collapses_values() {
        let classifier = UrlClassifier::with_strategy(DedupStrategy::Structure);
        let grouped = classifier
            .classify_deduplicate_and_group(&urls(&["http://e.com/p?id=1", "http://e.com/p?id=2"]));
        assert_eq!(grouped[&SqliCandidates], urls(&["http://e.com/p?id=1"]));
    }

    #[test]
    fn test_custom_rule() {
        let mut classifier = UrlClassifier::new();
        classifier.add_rule(
            ClassificationRule::new("graphql", SsrfCandidates, MatchLocation::FullUrl, &[r"/graphql"], 0.6)
                .unwrap(),
        );
        assert!(classifier.classify("http://e.com/graphql").has_group(SsrfCandidates));
    }

    #[test]
    fn test_statistics() {
        let stats = UrlClassifier::new().statistics(&urls(&[
            "http://e.com/a.js",
            "http://e.com/p?id=1",
            "http://e.com/about",
        ]));
        assert_eq!(stats.total_urls, 3);
        assert_eq!(stats.static_files, 1);
        assert_eq!(stats.classified_urls, 1);
        assert_eq!(stats.by_group[&SqliCandidates], 1);
        assert_eq!(stats.by_group[&Generic], 0);
    }

    #[test]
    fn test_result_serializes_as_jsonl_record() {
        let result = UrlClassifier::new().classify("http://e.com/r?next=/home");
        let line = serde_json::to_string(&result).unwrap();
        assert_eq!(
            line,
            r#"{"url":"http://e.com/r?next=/home","groups":["redirect_candidates"],"confidence":0.9}"#
        );
    }
}
