use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::project_io::{self, PROJECT_DIR};
use crate::model::config::ProjectConfig;
use crate::model::project::ProjectId;

/// Infer a project name from a directory name: hyphens and underscores
/// become spaces, each word title-cased.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + chars.as_str()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn cmd_init(args: InitArgs, root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // Check for parent project and warn
    if let Some(parent) = root.parent()
        && let Ok(parent_root) = project_io::discover_project(parent)
    {
        eprintln!(
            "Note: parent project found at {}/",
            parent_root.join(PROJECT_DIR).display()
        );
        eprintln!("Creating new project in ./{}/", PROJECT_DIR);
    }

    let name = args.name.unwrap_or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let config = ProjectConfig::new(ProjectId(args.id), name);
    let project = project_io::init_project(root, &config)?;

    println!("Initialized tasknet project: {}", project.config.project.name);
    println!("  tasks: {}", project.snapshot_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_name() {
        assert_eq!(infer_name("plant-upgrade"), "Plant Upgrade");
        assert_eq!(infer_name("bridge_retrofit-2026"), "Bridge Retrofit 2026");
        assert_eq!(infer_name("tasknet"), "Tasknet");
        assert_eq!(infer_name("--"), "");
    }
}
