//! Pipeline stages and their static dependency graph

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::finding::Finding;
use super::step::StepStatus;

/// A fixed phase of the scanning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[serde(rename = "subdomain_enumeration")]
    SubdomainEnum,
    DnsResolution,
    HttpProbing,
    WebCrawling,
    UrlClassification,
    #[serde(rename = "vulnerability_scanning")]
    VulnScanning,
    XssTesting,
    Fuzzing,
    SqliTesting,
}

impl PipelineStage {
    /// All stages in canonical dependency order
    pub const ALL: [PipelineStage; 9] = [
        PipelineStage::SubdomainEnum,
        PipelineStage::DnsResolution,
        PipelineStage::HttpProbing,
        PipelineStage::WebCrawling,
        PipelineStage::UrlClassification,
        PipelineStage::VulnScanning,
        PipelineStage::XssTesting,
        PipelineStage::Fuzzing,
        PipelineStage::SqliTesting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::SubdomainEnum => "subdomain_enumeration",
            PipelineStage::DnsResolution => "dns_resolution",
            PipelineStage::HttpProbing => "http_probing",
            PipelineStage::WebCrawling => "web_crawling",
            PipelineStage::UrlClassification => "url_classification",
            PipelineStage::VulnScanning => "vulnerability_scanning",
            PipelineStage::XssTesting => "xss_testing",
            PipelineStage::Fuzzing => "fuzzing",
            PipelineStage::SqliTesting => "sqli_testing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "subdomain_enumeration" | "subdomain_enum" | "subdomains" => {
                Some(PipelineStage::SubdomainEnum)
            }
            "dns_resolution" | "dns" => Some(PipelineStage::DnsResolution),
            "http_probing" | "http" => Some(PipelineStage::HttpProbing),
            "web_crawling" | "crawl" => Some(PipelineStage::WebCrawling),
            "url_classification" | "classify" => Some(PipelineStage::UrlClassification),
            "vulnerability_scanning" | "vuln_scanning" | "vulns" => {
                Some(PipelineStage::VulnScanning)
            }
            "xss_testing" | "xss" => Some(PipelineStage::XssTesting),
            "fuzzing" | "fuzz" => Some(PipelineStage::Fuzzing),
            "sqli_testing" | "sqli" => Some(PipelineStage::SqliTesting),
            _ => None,
        }
    }

    /// Stages that must have completed before this one may run
    pub fn dependencies(&self) -> &'static [PipelineStage] {
        use PipelineStage::*;
        match self {
            SubdomainEnum => &[],
            DnsResolution => &[SubdomainEnum],
            HttpProbing => &[DnsResolution],
            WebCrawling => &[HttpProbing],
            UrlClassification => &[WebCrawling],
            VulnScanning | XssTesting | Fuzzing | SqliTesting => &[UrlClassification],
        }
    }

    /// External tools that execute this stage (empty for internal transforms)
    pub fn tools(&self) -> &'static [&'static str] {
        use PipelineStage::*;
        match self {
            SubdomainEnum => &["subfinder"],
            DnsResolution => &["dnsx"],
            HttpProbing => &["httpx"],
            WebCrawling => &["katana", "gau"],
            UrlClassification => &[],
            VulnScanning => &["nuclei"],
            XssTesting => &["dalfox"],
            Fuzzing => &["ffuf"],
            SqliTesting => &["sqlmap"],
        }
    }

    /// Whether the stage is executed in-process rather than by tools
    pub fn is_internal(&self) -> bool {
        self.tools().is_empty()
    }

    /// Testing stages are the consumers of URL classification
    pub fn is_testing(&self) -> bool {
        self.dependencies() == [PipelineStage::UrlClassification]
    }

    /// Classification tag a stage filters its inputs by, if any
    pub fn input_group(&self) -> Option<ClassificationGroup> {
        match self {
            PipelineStage::XssTesting => Some(ClassificationGroup::XssCandidates),
            PipelineStage::SqliTesting => Some(ClassificationGroup::SqliCandidates),
            _ => None,
        }
    }

    /// Stage that runs a given tool
    pub fn for_tool(tool: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.tools().contains(&tool))
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Groups assigned to URLs by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationGroup {
    XssCandidates,
    SqliCandidates,
    RedirectCandidates,
    SsrfCandidates,
    Generic,
}

impl ClassificationGroup {
    pub const ALL: [ClassificationGroup; 5] = [
        ClassificationGroup::XssCandidates,
        ClassificationGroup::SqliCandidates,
        ClassificationGroup::RedirectCandidates,
        ClassificationGroup::SsrfCandidates,
        ClassificationGroup::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationGroup::XssCandidates => "xss_candidates",
            ClassificationGroup::SqliCandidates => "sqli_candidates",
            ClassificationGroup::RedirectCandidates => "redirect_candidates",
            ClassificationGroup::SsrfCandidates => "ssrf_candidates",
            ClassificationGroup::Generic => "generic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == s)
    }
}

impl std::fmt::Display for ClassificationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of one stage execution
///
/// Held by the run state manager so later stages can read dependency
/// outputs. Results are replaced, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: PipelineStage,
    pub status: StepStatus,
    /// Ordered output items (hosts, URLs, classification records)
    pub output: Vec<String>,
    pub output_path: Option<std::path::PathBuf>,
    pub findings: Vec<Finding>,
    pub duration: Duration,
    pub error: Option<String>,
    /// Exit code of the stage's tool (the highest one when several ran)
    pub exit_code: Option<i32>,
}

impl StageResult {
    pub fn new(stage: PipelineStage, status: StepStatus) -> Self {
        Self {
            stage,
            status,
            output: Vec::new(),
            output_path: None,
            findings: Vec::new(),
            duration: Duration::ZERO,
            error: None,
            exit_code: None,
        }
    }

    pub fn skipped(stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(stage, StepStatus::Skipped)
        }
    }

    pub fn failed(stage: PipelineStage, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            error: Some(error.into()),
            duration,
            ..Self::new(stage, StepStatus::Failed)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_round_trip() {
        for stage in PipelineStage::ALL {
            assert_eq!(PipelineStage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(PipelineStage::from_str("xss"), Some(PipelineStage::XssTesting));
        assert_eq!(PipelineStage::from_str("nope"), None);
    }

    #[test]
    fn test_serde_uses_stage_names() {
        let json = serde_json::to_string(&PipelineStage::SubdomainEnum).unwrap();
        assert_eq!(json, "\"subdomain_enumeration\"");
        let json = serde_json::to_string(&PipelineStage::VulnScanning).unwrap();
        assert_eq!(json, "\"vulnerability_scanning\"");
    }

    #[test]
    fn test_dependency_graph_is_acyclic_and_ordered() {
        // Every dependency appears earlier in ALL, which rules out cycles
        for (index, stage) in PipelineStage::ALL.iter().enumerate() {
            for dep in stage.dependencies() {
                let dep_index = PipelineStage::ALL.iter().position(|s| s == dep).unwrap();
                assert!(dep_index < index, "{} must precede {}", dep, stage);
            }
        }
    }

    #[test]
    fn test_classification_is_sole_fan_in_for_testing_stages() {
        let testing: Vec<_> = PipelineStage::ALL
            .into_iter()
            .filter(|s| s.is_testing())
            .collect();
        assert_eq!(
            testing,
            vec![
                PipelineStage::VulnScanning,
                PipelineStage::XssTesting,
                PipelineStage::Fuzzing,
                PipelineStage::SqliTesting,
            ]
        );
        assert!(PipelineStage::UrlClassification.is_internal());
    }

    #[test]
    fn test_stage_for_tool() {
        assert_eq!(PipelineStage::for_tool("gau"), Some(PipelineStage::WebCrawling));
        assert_eq!(PipelineStage::for_tool("sqlmap"), Some(PipelineStage::SqliTesting));
        assert_eq!(PipelineStage::for_tool("burp"), None);
    }
}
