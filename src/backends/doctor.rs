//! Doctor - External tool checks

use anyhow::Result;
use tracing::warn;

use crate::backends::executor::DEFAULT_WRAPPER;
use crate::core::model::{ItemError, ResultItem, ResultSet, Source};
use crate::core::render::{RenderConfig, Renderer};
use crate::core::util::command_exists;
use crate::snapshot::BackendKind;

/// Tool status
#[derive(Debug, Clone)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub required: bool,
    pub notes: Option<String>,
}

impl DependencyStatus {
    fn probe(name: &str, required: bool, notes: &str) -> Self {
        Self {
            name: name.to_string(),
            available: command_exists(name),
            required,
            notes: Some(notes.to_string()),
        }
    }

    pub fn to_result_item(&self) -> ResultItem {
        let status = if self.available { "✓" } else { "✗" };
        let required = if self.required { "required" } else { "optional" };

        let mut message = format!(
            "{} {} ({}) - {}",
            status,
            self.name,
            required,
            if self.available { "found" } else { "not found" }
        );
        if let Some(notes) = &self.notes {
            message.push_str(&format!("\n  Note: {}", notes));
        }

        let mut item = ResultItem::check(message, Source::System).with_data(serde_json::json!({
            "name": self.name,
            "available": self.available,
            "required": self.required,
        }));

        if !self.available && self.required {
            item = item.with_error(ItemError::new(
                "MISSING_DEPENDENCY",
                format!("{} is required but not found", self.name),
            ));
        }

        item
    }
}

/// Check the tools a workspace run depends on
pub fn check_dependencies(backend: BackendKind) -> Vec<DependencyStatus> {
    vec![
        DependencyStatus::probe("sh", true, "Every command runs through sh -c"),
        DependencyStatus::probe(
            "git",
            backend == BackendKind::Git,
            "Needed by the git snapshot backend; use --backend store without it",
        ),
        DependencyStatus::probe(
            DEFAULT_WRAPPER,
            false,
            "Only needed for --launcher cluster with the default wrapper",
        ),
    ]
}

/// Run the doctor command
pub fn run_doctor(backend: BackendKind, render_config: RenderConfig) -> Result<()> {
    let deps = check_dependencies(backend);

    let result_set: ResultSet = deps.iter().map(DependencyStatus::to_result_item).collect();
    Renderer::with_config(render_config).print(&result_set);

    for dep in deps.iter().filter(|d| d.required && !d.available) {
        warn!(tool = %dep.name, "required tool is missing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dependencies() {
        let deps = check_dependencies(BackendKind::Git);
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sh", "git", "run-cluster"]);

        let sh = &deps[0];
        assert!(sh.required);
        assert!(sh.available);
    }

    #[test]
    fn test_git_optional_for_store_backend() {
        let deps = check_dependencies(BackendKind::Store);
        let git = deps.iter().find(|d| d.name == "git").unwrap();
        assert!(!git.required);
    }

    #[test]
    fn test_missing_required_tool_is_flagged() {
        let dep = DependencyStatus {
            name: "nope".to_string(),
            available: false,
            required: true,
            notes: None,
        };
        let item = dep.to_result_item();
        assert_eq!(item.errors.len(), 1);
        assert_eq!(item.errors[0].code, "MISSING_DEPENDENCY");
        assert!(item.excerpt.unwrap().starts_with("✗ nope (required)"));
    }
}
