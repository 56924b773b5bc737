//! The set of prompts a pipeline renders from.

use crate::builder::build_prompt;
use crate::loader::{list_prompts, load_prompt, parse_prompt, BUILTIN_PROMPTS};
use crate::types::{BuiltPrompt, PromptDefinition};
use docchat_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Identifiers of the built-in prompts.
pub mod ids {
    pub const HISTORY_CHECK: &str = "history.check";
    pub const HISTORY_ANSWER: &str = "history.answer";
    pub const QUERY_ENHANCE: &str = "query.enhance";
    pub const METADATA_EXTRACT: &str = "metadata.extract";
    pub const QUERY_REWRITE: &str = "query.rewrite";
    pub const QUERY_METADATA: &str = "query.metadata";
    pub const ANSWER_GENERATE: &str = "answer.generate";
}

/// Prompt definitions indexed by id.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Library made of the built-in definitions only.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::with_capacity(BUILTIN_PROMPTS.len());
        for (name, source) in BUILTIN_PROMPTS {
            let definition = parse_prompt(source, name)?;
            prompts.insert(definition.id.clone(), definition);
        }
        Ok(Self { prompts })
    }

    /// Built-in definitions with workspace overrides applied.
    ///
    /// Every `.docchat/prompts/<id>.yml` file replaces the built-in of the same
    /// id, or adds a new prompt. An invalid override is an error rather than a
    /// silent fallback.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut library = Self::builtin()?;

        for id in list_prompts(workspace_path)? {
            let definition = load_prompt(workspace_path, &id)?;
            if library.prompts.contains_key(&id) {
                tracing::info!(prompt = %id, "Using workspace override for built-in prompt");
            }
            library.prompts.insert(id, definition);
        }

        Ok(library)
    }

    /// Look up a definition.
    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
    }

    /// Render a prompt by id.
    pub fn render(&self, id: &str, variables: HashMap<String, String>) -> AppResult<BuiltPrompt> {
        build_prompt(self.get(id)?, variables)
    }

    /// Sorted ids of every prompt in the library.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.prompts.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_builtin_has_all_pipeline_prompts() {
        let library = PromptLibrary::builtin().unwrap();
        for id in [
            ids::HISTORY_CHECK,
            ids::HISTORY_ANSWER,
            ids::QUERY_ENHANCE,
            ids::METADATA_EXTRACT,
            ids::QUERY_REWRITE,
            ids::QUERY_METADATA,
            ids::ANSWER_GENERATE,
        ] {
            assert!(library.get(id).is_ok(), "missing {}", id);
        }
        assert_eq!(library.ids().len(), 7);
    }

    #[test]
    fn test_render_history_check() {
        let library = PromptLibrary::builtin().unwrap();
        let built = library
            .render(
                ids::HISTORY_CHECK,
                vars(&[("query", "And in 2022?"), ("history", "user: revenue 2023")]),
            )
            .unwrap();

        assert!(built.user.contains("Query: And in 2022?"));
        assert!(built.user.contains("user: revenue 2023"));
        assert!(built.user.contains("\"yes\" or \"no\""));
    }

    #[test]
    fn test_render_generation_has_system_message() {
        let library = PromptLibrary::builtin().unwrap();
        let built = library
            .render(
                ids::ANSWER_GENERATE,
                vars(&[("context", "chunk one\n\nchunk two"), ("question", "why?")]),
            )
            .unwrap();

        assert!(built.system.is_some());
        assert!(built.user.contains("Context: chunk one\n\nchunk two"));
        assert!(built.user.contains("Question: why?"));
    }

    #[test]
    fn test_unknown_prompt() {
        let library = PromptLibrary::builtin().unwrap();
        assert_eq!(library.get("nope").unwrap_err().kind(), "prompt");
    }

    #[test]
    fn test_workspace_override_replaces_builtin() {
        let temp = TempDir::new().unwrap();
        let dir = crate::loader::prompts_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("query.rewrite.yml"),
            r#"
id: query.rewrite
title: Keyword rewrite
apiVersion: "1.1"
template: "KEYWORDS: {{query}}"
"#,
        )
        .unwrap();

        let library = PromptLibrary::load(temp.path()).unwrap();
        let built = library
            .render(ids::QUERY_REWRITE, vars(&[("query", "bonus policy")]))
            .unwrap();
        assert_eq!(built.user, "KEYWORDS: bonus policy");
        assert_eq!(library.ids().len(), 7);
    }

    #[test]
    fn test_invalid_override_is_error() {
        let temp = TempDir::new().unwrap();
        let dir = crate::loader::prompts_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("answer.generate.yml"), "id: answer.generate\n").unwrap();

        assert!(PromptLibrary::load(temp.path()).is_err());
    }
}
