//! Finding parsers for nuclei JSONL and dalfox JSON output

use serde::Deserialize;

use crate::domain::{Confidence, Finding, Severity};

/// One nuclei result line
#[derive(Debug, Deserialize)]
pub struct NucleiFinding {
    /// Template ID (e.g., "cve-2021-44228-log4j")
    #[serde(rename = "template-id")]
    pub template_id: String,

    pub info: Option<NucleiInfo>,

    pub host: Option<String>,

    #[serde(rename = "matched-at")]
    pub matched_at: Option<String>,

    /// Curl command to reproduce
    #[serde(rename = "curl-command")]
    pub curl_command: Option<String>,

    #[serde(rename = "matcher-name")]
    pub matcher_name: Option<String>,

    #[serde(rename = "extracted-results")]
    pub extracted_results: Option<Vec<String>>,
}

/// Nuclei template info block
#[derive(Debug, Deserialize)]
pub struct NucleiInfo {
    pub name: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub reference: Option<NucleiReferences>,
    pub remediation: Option<String>,
}

/// References can be string or array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NucleiReferences {
    Single(String),
    Multiple(Vec<String>),
}

impl NucleiReferences {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            NucleiReferences::Single(s) => vec![s.clone()],
            NucleiReferences::Multiple(v) => v.clone(),
        }
    }
}

impl NucleiFinding {
    fn into_finding(self) -> Finding {
        let info = self.info;
        let severity = info
            .as_ref()
            .and_then(|i| i.severity.as_deref())
            .and_then(Severity::from_str)
            .unwrap_or(Severity::Info);
        let url = self
            .matched_at
            .or(self.host)
            .unwrap_or_else(|| "unknown".to_string());

        let mut finding = Finding::new("nuclei", self.template_id.clone(), severity, url);
        finding.confidence = Confidence::Firm;
        finding.title = Some(
            info.as_ref()
                .and_then(|i| i.name.clone())
                .unwrap_or_else(|| template_id_to_title(&self.template_id)),
        );
        finding.parameter = self.matcher_name;
        finding.reproduction_steps = self.curl_command;

        let mut description = info
            .as_ref()
            .and_then(|i| i.description.clone())
            .map(|d| d.trim().to_string())
            .unwrap_or_default();
        if let Some(extracted) = self.extracted_results.filter(|e| !e.is_empty()) {
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str(&format!("Extracted: {}", extracted.join(", ")));
        }
        if !description.is_empty() {
            finding.description = Some(description);
        }

        if let Some(info) = info {
            finding.remediation = info.remediation;
            finding.references = info.reference.map(|r| r.as_vec()).unwrap_or_default();
        }
        finding
    }
}

/// "cve-2021-44228-log4j" -> "Cve 2021 44228 Log4j"
fn template_id_to_title(template_id: &str) -> String {
    template_id
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse nuclei JSONL output; malformed lines are skipped
pub fn parse_nuclei(raw: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (line_num, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NucleiFinding>(line) {
            Ok(finding) => findings.push(finding.into_finding()),
            Err(e) => tracing::debug!("nuclei line {}: failed to parse JSON: {}", line_num + 1, e),
        }
    }
    findings
}

/// One dalfox result object
#[derive(Debug, Deserialize)]
pub struct DalfoxFinding {
    /// "V" (verified), "P" (potential) or "R" (reflected only)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    pub param: Option<String>,
    pub payload: Option<String>,
    pub evidence: Option<String>,
    pub severity: Option<String>,
    pub cwe: Option<String>,
    #[serde(rename = "message_str")]
    pub message: Option<String>,
}

impl DalfoxFinding {
    fn into_finding(self) -> Option<Finding> {
        let (title, default_confidence) = match self.kind.as_str() {
            "V" => ("Confirmed XSS found via dalfox", Confidence::Confirmed),
            "P" => ("Potential XSS found via dalfox", Confidence::Firm),
            _ => return None,
        };
        if self.url.is_empty() {
            return None;
        }

        let severity = self
            .severity
            .as_deref()
            .and_then(Severity::from_str)
            .unwrap_or(Severity::Medium);
        let mut finding = Finding::new("dalfox", "xss", severity, self.url.clone());
        finding.confidence = default_confidence;
        finding.title = Some(title.to_string());
        finding.parameter = self.param.clone();

        let mut description = format!("XSS vulnerability detected at {}.", self.url);
        if let Some(param) = &self.param {
            description.push_str(&format!(" Parameter: {}.", param));
        }
        if let Some(message) = &self.message {
            description.push_str(&format!(" {}", message));
        }
        finding.description = Some(description);

        if let Some(payload) = &self.payload {
            finding.reproduction_steps = Some(format!("Send payload: {}", payload));
        }
        if let Some(evidence) = self.evidence.filter(|e| !e.is_empty()) {
            finding.description = finding
                .description
                .map(|d| format!("{}\n\nEvidence: {}", d, evidence));
        }
        if let Some(cwe) = self.cwe {
            finding.references.push(cwe);
        }
        Some(finding)
    }
}

/// Parse dalfox output: either a JSON array or one object per line
pub fn parse_dalfox(raw: &str) -> Vec<Finding> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let objects: Vec<DalfoxFinding> = match serde_json::from_str::<Vec<DalfoxFinding>>(trimmed) {
        Ok(objects) => objects,
        Err(_) => trimmed
            .lines()
            .map(|l| l.trim().trim_end_matches(','))
            .filter(|l| l.starts_with('{'))
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect(),
    };
    objects
        .into_iter()
        .filter_map(DalfoxFinding::into_finding)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nuclei_line() {
        let raw = r#"{"template-id":"git-config","info":{"name":"Git Config Disclosure","severity":"medium","reference":"https://example.org/ref","remediation":"Block /.git"},"host":"https://a.example.com","matched-at":"https://a.example.com/.git/config","extracted-results":["[core]"]}
not json
{"template-id":"tech-detect","host":"https://b.example.com"}"#;
        let findings = parse_nuclei(raw);
        assert_eq!(findings.len(), 2);

        let first = &findings[0];
        assert_eq!(first.finding_type, "git-config");
        assert_eq!(first.severity, Severity::Medium);
        assert_eq!(first.url, "https://a.example.com/.git/config");
        assert_eq!(first.host, "a.example.com");
        assert_eq!(first.title.as_deref(), Some("Git Config Disclosure"));
        assert_eq!(first.references, vec!["https://example.org/ref"]);
        assert!(first.description.as_deref().unwrap().contains("[core]"));

        let second = &findings[1];
        assert_eq!(second.severity, Severity::Info);
        assert_eq!(second.title.as_deref(), Some("Tech Detect"));
        assert_eq!(second.tool, "nuclei");
    }

    #[test]
    fn test_parse_dalfox_array_and_lines() {
        let array = r#"[{"type":"V","url":"http://e.com/?q=1","param":"q","payload":"<svg/onload=alert(1)>","severity":"High"},
            {"type":"R","url":"http://e.com/?x=1"}]"#;
        let findings = parse_dalfox(array);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::Confirmed);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].parameter.as_deref(), Some("q"));

        let lines = "{\"type\":\"P\",\"url\":\"http://e.com/s?term=a\"}\n";
        let findings = parse_dalfox(lines);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].finding_type, "xss");
    }

    #[test]
    fn test_template_title() {
        assert_eq!(template_id_to_title("cve-2021-44228-log4j"), "Cve 2021 44228 Log4j");
    }
}
