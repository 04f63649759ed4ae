//! Renderer module
//!
//! Renders ResultSet to different output formats: jsonl, json, md, raw

use crate::core::model::{Kind, ResultItem, ResultSet};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Json,
    Markdown,
    Raw,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "json" => Ok(OutputFormat::Json),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "raw" => Ok(OutputFormat::Raw),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Render configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl RenderConfig {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            pretty: false,
        }
    }

    pub fn with_pretty(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }
}

/// Renderer for result sets
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            config: RenderConfig::new(format),
        }
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render a result set to a string
    pub fn render(&self, result_set: &ResultSet) -> String {
        match self.config.format {
            OutputFormat::Jsonl => self.render_jsonl(result_set),
            OutputFormat::Json => self.render_json(result_set),
            OutputFormat::Markdown => self.render_markdown(result_set),
            OutputFormat::Raw => self.render_raw(result_set),
        }
    }

    /// Render and print to stdout
    pub fn print(&self, result_set: &ResultSet) {
        let rendered = self.render(result_set);
        match self.config.format {
            // Raw output is passed through untouched so pipelines can consume it
            OutputFormat::Raw => print!("{}", rendered),
            _ => println!("{}", rendered),
        }
    }

    /// Render as JSON Lines (one JSON object per line)
    fn render_jsonl(&self, result_set: &ResultSet) -> String {
        result_set
            .items
            .iter()
            .filter_map(|item| {
                if self.config.pretty {
                    serde_json::to_string_pretty(item).ok()
                } else {
                    serde_json::to_string(item).ok()
                }
            })
            .collect::<Vec<_>>()
            .join(if self.config.pretty { "\n\n" } else { "\n" })
    }

    /// Render as a single JSON array
    fn render_json(&self, result_set: &ResultSet) -> String {
        if self.config.pretty {
            serde_json::to_string_pretty(&result_set.items).unwrap_or_else(|_| "[]".to_string())
        } else {
            serde_json::to_string(&result_set.items).unwrap_or_else(|_| "[]".to_string())
        }
    }

    /// Render as Markdown
    fn render_markdown(&self, result_set: &ResultSet) -> String {
        let mut output = String::new();

        let sections: [(Kind, &str); 6] = [
            (Kind::Error, "Errors"),
            (Kind::Run, "Runs"),
            (Kind::Entry, "Cache Entries"),
            (Kind::Snapshot, "Snapshots"),
            (Kind::Check, "Checks"),
            (Kind::File, "Files"),
        ];

        for (kind, title) in sections {
            let items: Vec<&ResultItem> =
                result_set.items.iter().filter(|i| i.kind == kind).collect();
            if items.is_empty() {
                continue;
            }

            output.push_str(&format!("## {}\n\n", title));
            for item in items {
                if kind == Kind::Error {
                    for error in &item.errors {
                        output.push_str(&format!("- **{}**: {}\n", error.code, error.message));
                    }
                } else if kind == Kind::File {
                    if let Some(path) = &item.path {
                        output.push_str(&format!("- `{}`\n", path));
                    }
                } else {
                    self.render_item_md(&mut output, item);
                }
            }
            output.push('\n');
        }

        output
    }

    fn render_item_md(&self, output: &mut String, item: &ResultItem) {
        if let Some(data) = &item.data {
            if let Some(command) = data.get("command").and_then(|c| c.as_str()) {
                output.push_str(&format!("### `{}`", command));
                if let Some(status) = data.get("status").and_then(|s| s.as_str()) {
                    output.push_str(&format!(" ({})", status));
                }
                output.push('\n');
            }
        }

        if let Some(excerpt) = &item.excerpt {
            output.push_str("\n```\n");
            output.push_str(excerpt);
            if !excerpt.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("```\n");
        }

        if item.meta.truncated {
            output.push_str("\n> ⚠️ Content was truncated\n");
        }

        for error in &item.errors {
            output.push_str(&format!("\n> **{}**: {}\n", error.code, error.message));
        }

        output.push('\n');
    }

    /// Render as raw output: excerpts only
    fn render_raw(&self, result_set: &ResultSet) -> String {
        result_set
            .items
            .iter()
            .filter_map(|item| item.excerpt.clone())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ItemError, Source};

    #[test]
    fn test_render_jsonl() {
        let mut result_set = ResultSet::new();
        result_set.push(ResultItem::file("case.struct"));
        result_set.push(ResultItem::file("case.in0"));

        let renderer = Renderer::new(OutputFormat::Jsonl);
        let output = renderer.render(&result_set);

        assert!(output.contains("case.struct"));
        assert!(output.contains("case.in0"));
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn test_render_json() {
        let mut result_set = ResultSet::new();
        result_set.push(ResultItem::snapshot("abc"));

        let renderer = Renderer::new(OutputFormat::Json);
        let output = renderer.render(&result_set);

        assert!(output.starts_with('['));
        assert!(output.ends_with(']'));
    }

    #[test]
    fn test_render_raw_is_output_only() {
        let mut result_set = ResultSet::new();
        result_set.push(ResultItem::run("line 1\nline 2\n", Source::Exec));

        let renderer = Renderer::new(OutputFormat::Raw);
        assert_eq!(renderer.render(&result_set), "line 1\nline 2\n");
    }

    #[test]
    fn test_render_markdown_sections() {
        let mut result_set = ResultSet::new();
        result_set.push(
            ResultItem::run("done", Source::Cache)
                .with_data(serde_json::json!({"command": "x lstart", "status": "hit"})),
        );
        result_set.push(ResultItem::error(ItemError::new("E1", "broken")));

        let renderer = Renderer::new(OutputFormat::Markdown);
        let output = renderer.render(&result_set);

        assert!(output.contains("## Runs"));
        assert!(output.contains("### `x lstart` (hit)"));
        assert!(output.contains("- **E1**: broken"));
        // Errors come first
        assert!(output.find("## Errors").unwrap() < output.find("## Runs").unwrap());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("jsonl".parse::<OutputFormat>().unwrap(), OutputFormat::Jsonl);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("MARKDOWN".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("raw".parse::<OutputFormat>().unwrap(), OutputFormat::Raw);
    }

    #[test]
    fn test_output_format_parse_invalid() {
        let result = "invalid".parse::<OutputFormat>();
        assert!(result.unwrap_err().contains("Unknown format"));
    }

    #[test]
    fn test_render_config_with_pretty() {
        let config = RenderConfig::with_pretty(OutputFormat::Jsonl, true);
        assert_eq!(config.format, OutputFormat::Jsonl);
        assert!(config.pretty);
        assert!(!RenderConfig::default().pretty);
    }
}
