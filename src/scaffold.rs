// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Starter folder tree for an auto-feedback project

use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::{FeedbackError, Result};

const DIRECTORIES: &[&str] = &["app", "agents", "prompts", "data", "utils", "notebooks"];

const FILES: &[(&str, &str)] = &[
    ("README.md", "# Auto-Feedback Engine for Students Using AI Agents\n"),
    (
        "requirements.txt",
        "openai\nlangchain\nstreamlit\nflask\njinja2\ntiktoken\npandas\nscikit-learn\n",
    ),
    ("app/main.py", "# Streamlit or Gradio app goes here\n"),
    ("agents/feedback_agent.py", "# Feedback agent logic goes here\n"),
    ("agents/rubric_grader.py", "# Optional rubric grading logic\n"),
    (
        "prompts/feedback_template.txt",
        "You are an AI tutor. Evaluate the student's essay and return feedback.\n",
    ),
    (
        "prompts/grading_rubric.md",
        "## Grading Rubric\n- Clarity\n- Structure\n- Grammar\n- Relevance\n",
    ),
    ("data/sample_essay_1.txt", "This is a sample essay.\n"),
    ("data/sample_essay_2.txt", "Another example essay.\n"),
    ("utils/preprocess.py", "# Text preprocessing utils\n"),
    ("utils/metrics.py", "# Scoring and evaluation utilities\n"),
    ("notebooks/prompt_experiments.ipynb", ""),
];

/// Directories and files making up a project skeleton
#[derive(Debug, Clone, Copy)]
pub struct ProjectManifest {
    pub directories: &'static [&'static str],
    /// Relative path and literal content
    pub files: &'static [(&'static str, &'static str)],
}

/// What a scaffold run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub root: PathBuf,
    pub directories: usize,
    pub files_written: usize,
    /// Files that existed before and were replaced
    pub files_overwritten: usize,
}

impl ProjectManifest {
    /// The auto-feedback agent project layout
    pub fn auto_feedback_agent() -> Self {
        Self {
            directories: DIRECTORIES,
            files: FILES,
        }
    }

    /// Reject absolute paths and parent components
    pub fn validate(&self) -> Result<()> {
        let paths = self
            .directories
            .iter()
            .chain(self.files.iter().map(|(path, _)| path));

        for path in paths {
            let ok = !path.is_empty()
                && Path::new(path)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !ok {
                return Err(FeedbackError::InvalidManifest(path.to_string()));
            }
        }
        Ok(())
    }

    /// Every path the manifest would create under `root`, directories first
    pub fn plan(&self, root: &Path) -> Vec<PathBuf> {
        self.directories
            .iter()
            .map(|d| root.join(d))
            .chain(self.files.iter().map(|(f, _)| root.join(f)))
            .collect()
    }

    /// Write the tree under `root`
    ///
    /// Existing directories are kept and existing files overwritten, so
    /// repeated runs leave the same tree behind.
    pub fn scaffold(&self, root: &Path) -> Result<ScaffoldReport> {
        self.validate()?;

        for dir in self.directories {
            let path = root.join(dir);
            std::fs::create_dir_all(&path)?;
            debug!("Ensured directory {:?}", path);
        }

        let mut overwritten = 0;
        for (relative, content) in self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if path.exists() {
                overwritten += 1;
            }
            std::fs::write(&path, content)?;
            debug!("Wrote {:?} ({} bytes)", path, content.len());
        }

        info!(
            "Scaffolded {:?}: {} directories, {} files ({} overwritten)",
            root,
            self.directories.len(),
            self.files.len(),
            overwritten
        );

        Ok(ScaffoldReport {
            root: root.to_path_buf(),
            directories: self.directories.len(),
            files_written: self.files.len(),
            files_overwritten: overwritten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Relative path -> content (None for directories)
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<String>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Option<String>>) {
            for entry in std::fs::read_dir(dir).unwrap().flatten() {
                let path = entry.path();
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                if path.is_dir() {
                    out.insert(rel, None);
                    walk(root, &path, out);
                } else {
                    out.insert(rel, Some(std::fs::read_to_string(&path).unwrap()));
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    #[test]
    fn test_builtin_manifest_is_valid() {
        let manifest = ProjectManifest::auto_feedback_agent();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.directories.len(), 6);
        assert_eq!(manifest.files.len(), 12);
    }

    #[test]
    fn test_scaffold_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("auto_feedback_agent");

        let report = ProjectManifest::auto_feedback_agent().scaffold(&root).unwrap();
        assert_eq!(report.files_written, 12);
        assert_eq!(report.files_overwritten, 0);

        assert!(root.join("notebooks").is_dir());
        assert_eq!(
            std::fs::read_to_string(root.join("prompts/grading_rubric.md")).unwrap(),
            "## Grading Rubric\n- Clarity\n- Structure\n- Grammar\n- Relevance\n"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("notebooks/prompt_experiments.ipynb")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_scaffold_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        let manifest = ProjectManifest::auto_feedback_agent();

        manifest.scaffold(&root).unwrap();
        let first = snapshot(&root);

        std::fs::write(root.join("README.md"), "edited by hand").unwrap();
        let report = manifest.scaffold(&root).unwrap();
        let second = snapshot(&root);

        assert_eq!(report.files_overwritten, 12);
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_lists_every_path() {
        let root = Path::new("out");
        let plan = ProjectManifest::auto_feedback_agent().plan(root);
        assert_eq!(plan.len(), 18);
        assert_eq!(plan[0], PathBuf::from("out/app"));
        assert!(plan.contains(&PathBuf::from("out/utils/metrics.py")));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let manifest = ProjectManifest {
            directories: &["ok"],
            files: &[("../outside.txt", "x")],
        };
        assert!(matches!(
            manifest.validate(),
            Err(FeedbackError::InvalidManifest(p)) if p == "../outside.txt"
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(manifest.scaffold(dir.path()).is_err());
        assert!(!dir.path().join("ok").exists());
    }

    #[test]
    fn test_rejects_absolute_paths() {
        let manifest = ProjectManifest {
            directories: &["/etc/evil"],
            files: &[],
        };
        assert!(manifest.validate().is_err());
    }
}
