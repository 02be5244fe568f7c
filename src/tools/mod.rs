//! External tool adapters
//!
//! Every tool sits behind [`ToolAdapter`]. The built-in tools are a closed
//! set of [`ToolKind`]s driven by [`CommandAdapter`]; tests and embedders can
//! register their own implementations in a [`ToolRegistry`].

mod command;
mod kind;
mod nuclei;
mod registry;

pub use command::CommandAdapter;
pub use kind::ToolKind;
pub use nuclei::{DalfoxFinding, NucleiFinding, parse_dalfox, parse_nuclei};
pub use registry::ToolRegistry;

use async_trait::async_trait;

use crate::domain::{Finding, ToolConfig, ToolResult};
use crate::error::Result;

/// Trait for tool adapters
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name as used in profiles and stage tool lists
    fn name(&self) -> &str;

    /// Run the tool once over all inputs.
    ///
    /// A non-zero exit is reported in the result, not as an error. Errors
    /// are reserved for a missing binary, a timeout or a spawn/IO failure.
    async fn run(&self, inputs: &[String], config: &ToolConfig) -> Result<ToolResult>;

    /// Normalized findings from raw tool output
    fn parse_output(&self, raw: &str) -> Vec<Finding>;

    /// Check if the tool can be run (binary exists)
    fn is_available(&self) -> bool;

    /// Output items (hosts, URLs) from raw stdout, in order
    fn extract_items(&self, stdout: &str) -> Vec<String> {
        extract_output_lines(self.name(), stdout)
    }
}

const FALLBACK_KEYS: [&str; 4] = ["url", "host", "target", "endpoint"];

/// Split tool stdout into output items.
///
/// JSON lines yield the field the tool reports its result in (`host` for
/// subfinder/dnsx, `url` for httpx, `url` or `endpoint` for katana/gau),
/// falling back to the first of `url`, `host`, `target`, `endpoint`. Other
/// lines are kept verbatim after trimming. Empty items are dropped.
pub fn extract_output_lines(tool: &str, stdout: &str) -> Vec<String> {
    let mut items = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                if let Some(item) = json_item(tool, &value) {
                    items.push(item);
                }
                continue;
            }
        }
        items.push(line.to_string());
    }
    items
}

fn json_item(tool: &str, value: &serde_json::Value) -> Option<String> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let specific = match tool {
        "subfinder" | "dnsx" => field("host"),
        "httpx" => field("url"),
        "katana" | "gau" => field("url").or_else(|| field("endpoint")).or_else(|| {
            // katana v1 nests the crawled URL under `request`
            value
                .pointer("/request/endpoint")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        }),
        _ => None,
    };
    specific.or_else(|| FALLBACK_KEYS.iter().find_map(|key| field(*key)))
}
