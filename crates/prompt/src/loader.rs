//! Prompt loader for YAML prompt definitions.
//!
//! Built-in definitions ship inside the binary; a workspace can override any
//! of them with a file named `<id>.yml` in `.docchat/prompts/`.

use crate::types::PromptDefinition;
use docchat_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Built-in prompt sources, keyed by file name.
pub(crate) const BUILTIN_PROMPTS: [(&str, &str); 7] = [
    (
        "history.check.yml",
        include_str!("../prompts/history.check.yml"),
    ),
    (
        "history.answer.yml",
        include_str!("../prompts/history.answer.yml"),
    ),
    (
        "query.enhance.yml",
        include_str!("../prompts/query.enhance.yml"),
    ),
    (
        "metadata.extract.yml",
        include_str!("../prompts/metadata.extract.yml"),
    ),
    (
        "query.rewrite.yml",
        include_str!("../prompts/query.rewrite.yml"),
    ),
    (
        "query.metadata.yml",
        include_str!("../prompts/query.metadata.yml"),
    ),
    (
        "answer.generate.yml",
        include_str!("../prompts/answer.generate.yml"),
    ),
];

/// Directory holding workspace prompt overrides.
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".docchat").join("prompts")
}

/// Load a prompt definition by ID from the workspace.
///
/// This function searches for a prompt file named `<id>.yml` in the
/// `.docchat/prompts/` directory.
///
/// # Example
/// ```no_run
/// use docchat_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.generate")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file {:?} declares id '{}', expected '{}'",
            prompt_file, definition.id, prompt_id
        )));
    }

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List all prompt IDs overridden in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

/// Parse and validate a YAML prompt definition.
pub(crate) fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.api_version.is_empty() {
        return Err(AppError::Prompt(
            "Prompt apiVersion cannot be empty".to_string(),
        ));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    // Validate API version format (simple check)
    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_prompt(dir: &Path, id: &str, valid: bool) -> PathBuf {
        let dir = prompts_dir(dir);
        fs::create_dir_all(&dir).unwrap();

        let content = if valid {
            format!(
                r#"
id: {}
title: "Test Prompt"
apiVersion: "1.0"
createdBy: test
template: "Test template: {{{{query}}}}"
"#,
                id
            )
        } else {
            "invalid: yaml: content:".to_string()
        };

        let file_path = dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_builtin_prompts_are_valid() {
        for (name, source) in BUILTIN_PROMPTS {
            let def = parse_prompt(source, name).unwrap();
            assert_eq!(format!("{}.yml", def.id), name);
        }
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "test.prompt", true);

        let prompt = load_prompt(temp_dir.path(), "test.prompt").unwrap();
        assert_eq!(prompt.id, "test.prompt");
        assert_eq!(prompt.title, "Test Prompt");
        assert_eq!(prompt.template, "Test template: {{query}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "invalid", false);

        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_load_rejects_mismatched_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_prompt(temp_dir.path(), "query.rewrite", true);
        fs::rename(&path, path.with_file_name("answer.generate.yml")).unwrap();

        let err = load_prompt(temp_dir.path(), "answer.generate").unwrap_err();
        assert!(err.to_string().contains("expected 'answer.generate'"));
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "prompt2", true);
        create_test_prompt(temp_dir.path(), "prompt1", true);

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["prompt1", "prompt2"]);
    }

    #[test]
    fn test_list_prompts_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert!(prompts.is_empty());
    }

    #[test]
    fn test_validate_bad_api_version() {
        let yaml = r#"
id: bad
title: Bad
apiVersion: "1"
template: "x"
"#;
        assert!(parse_prompt(yaml, "inline").is_err());
    }
}
