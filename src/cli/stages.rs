//! Stages command implementation

use anyhow::Result;
use std::path::Path;

use scanflow::PipelineStage;

use super::{load_config, tool_registry};

/// List every stage with its dependencies and tool availability
pub async fn stages_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = tool_registry(&config);

    println!("Stages ({}):\n", PipelineStage::ALL.len());

    for stage in PipelineStage::ALL {
        let runnable = stage.is_internal()
            || stage.tools().iter().any(|tool| registry.is_available(tool));
        println!(
            "  {} {}",
            if runnable { "+" } else { "-" },
            stage.as_str()
        );

        if !stage.dependencies().is_empty() {
            let deps: Vec<&str> = stage.dependencies().iter().map(|d| d.as_str()).collect();
            println!("    Requires: {}", deps.join(", "));
        }

        if stage.is_internal() {
            println!("    Tools:    (built in)");
        } else {
            let tools: Vec<String> = stage
                .tools()
                .iter()
                .map(|tool| {
                    if registry.is_available(tool) {
                        tool.to_string()
                    } else {
                        format!("{} (missing)", tool)
                    }
                })
                .collect();
            println!("    Tools:    {}", tools.join(", "));
        }
    }

    Ok(())
}
