use crate::providers::ProviderRegistry;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8000/v1";

/// Parses `KEY=VALUE` lines. Comments, blank lines and lines without `=` are
/// skipped; matching surrounding quotes are removed from values.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file {}", path.display()))?;
    Ok(parse_env(&content))
}

/// Env block pointing every registered provider at one local server.
pub fn render_local_env(registry: &ProviderRegistry, base_url: &str) -> String {
    let mut output = String::from("# Local API URLs\n");
    for provider in registry.providers() {
        output.push_str(&format!("{}={}\n", provider.config().base_url_key, base_url));
    }
    output
}

/// Rewrites an existing env file's content: every line is kept except old
/// provider base URL entries, then the fresh block is appended.
pub fn merge_local_env(existing: &str, registry: &ProviderRegistry, base_url: &str) -> String {
    let block = render_local_env(registry, base_url);
    let header = block.lines().next().unwrap_or_default();
    let managed: Vec<&str> = registry
        .providers()
        .map(|provider| provider.config().base_url_key)
        .collect();

    let mut kept: Vec<&str> = existing
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed == header {
                return false;
            }
            let entry = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            match entry.split_once('=') {
                Some((key, _)) if !trimmed.starts_with('#') => !managed.contains(&key.trim()),
                _ => true,
            }
        })
        .collect();
    while kept.last().is_some_and(|line| line.trim().is_empty()) {
        kept.pop();
    }

    let mut output = String::new();
    for line in kept {
        output.push_str(line);
        output.push('\n');
    }
    if !output.is_empty() {
        output.push('\n');
    }
    output.push_str(&block);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_env_skips_comments_and_blanks() {
        let content = "\
# API Keys\n\
#OPENAI_API_KEY=\n\
\n\
DEEPSEEK_LOCAL_API_BASE_URL=http://localhost:8000/v1\n\
export CODELLAMA_LOCAL_API_BASE_URL=\"http://gpu-box:8000/v1\"\n\
not a pair\n";

        let vars = parse_env(content);
        assert_eq!(vars.len(), 2);
        assert_eq!(
            vars.get("DEEPSEEK_LOCAL_API_BASE_URL").map(String::as_str),
            Some("http://localhost:8000/v1")
        );
        assert_eq!(
            vars.get("CODELLAMA_LOCAL_API_BASE_URL").map(String::as_str),
            Some("http://gpu-box:8000/v1")
        );
    }

    #[test]
    fn merge_local_env_keeps_other_entries() {
        let existing = "\
# API Keys for bolt.diy\n\
OPENAI_API_KEY=sk-keep-me\n\
#GROQ_API_KEY=\n\
\n\
# Local API URLs\n\
DEEPSEEK_LOCAL_API_BASE_URL=http://old:8000/v1\n\
CODELLAMA_LOCAL_API_BASE_URL=http://old:8000/v1\n";

        let merged = merge_local_env(existing, &ProviderRegistry::builtin(), "http://gpu-box:8000/v1");

        assert!(merged.starts_with("# API Keys for bolt.diy\nOPENAI_API_KEY=sk-keep-me\n#GROQ_API_KEY=\n"));
        assert!(!merged.contains("http://old:8000/v1"));
        assert_eq!(merged.matches("# Local API URLs").count(), 1);

        let vars = parse_env(&merged);
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["OPENAI_API_KEY"], "sk-keep-me");
        assert_eq!(vars["DEEPSEEK_LOCAL_API_BASE_URL"], "http://gpu-box:8000/v1");
    }

    #[test]
    fn merge_local_env_on_empty_file_is_just_the_block() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(
            merge_local_env("", &registry, DEFAULT_LOCAL_BASE_URL),
            render_local_env(&registry, DEFAULT_LOCAL_BASE_URL)
        );
    }

    #[test]
    fn parse_env_keeps_equals_in_values() {
        let vars = parse_env("TOKEN=abc=def\n");
        assert_eq!(vars.get("TOKEN").map(String::as_str), Some("abc=def"));
    }

    #[test]
    fn load_env_file_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DEEPSEEK_LOCAL_API_BASE_URL=http://localhost:1234").unwrap();

        let vars = load_env_file(file.path()).unwrap();
        assert_eq!(
            vars.get("DEEPSEEK_LOCAL_API_BASE_URL").map(String::as_str),
            Some("http://localhost:1234")
        );
    }

    #[test]
    fn render_local_env_lists_each_provider() {
        let rendered = render_local_env(&ProviderRegistry::builtin(), DEFAULT_LOCAL_BASE_URL);
        assert!(rendered.contains("CODELLAMA_LOCAL_API_BASE_URL=http://localhost:8000/v1\n"));
        assert!(rendered.contains("DEEPSEEK_LOCAL_API_BASE_URL=http://localhost:8000/v1\n"));

        let vars = parse_env(&rendered);
        assert_eq!(vars.len(), 2);
    }
}
