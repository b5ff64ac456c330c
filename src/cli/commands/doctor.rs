//! Doctor command - verify API keys and configuration.

use crate::cli::Output;
use crate::config::{CompletionProvider, Prompts, Settings};
use crate::transcription::AsrBackend;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Podtekst Doctor");
    println!();
    println!("Checking API keys and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Keys").bold());
    let key_checks = check_api_keys(settings);
    for check in &key_checks {
        check.print();
    }
    checks.extend(key_checks);

    println!();

    println!("{}", style("Storage").bold());
    let dir_checks = check_storage(settings);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_checks = vec![check_config_file(), check_settings(settings), check_prompts(settings)];
    for check in &config_checks {
        check.print();
    }
    checks.extend(config_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before processing episodes.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Podtekst is ready to use.");
    }

    Ok(())
}

/// Check the keys the configured backends need.
fn check_api_keys(settings: &Settings) -> Vec<CheckResult> {
    let backend = settings.transcription.backend;
    let mut results = Vec::new();

    if backend != AsrBackend::OpenAi {
        results.push(check_env_key(
            "REPLICATE_API_TOKEN",
            std::env::var("REPLICATE_API_TOKEN").ok(),
            true,
            &format!("needed by the {} backend", backend),
        ));
    }

    if backend.supports_diarization() {
        results.push(check_env_key(
            "HUGGINGFACE_API_KEY",
            std::env::var("HUGGINGFACE_API_KEY").ok(),
            false,
            "diarization may fail without it",
        ));
    }

    let openai_needed = backend == AsrBackend::OpenAi
        || settings.refinement.provider == CompletionProvider::OpenAi;
    if openai_needed {
        results.push(check_env_key(
            "OPENAI_API_KEY",
            std::env::var("OPENAI_API_KEY").ok(),
            true,
            "needed for OpenAI calls",
        ));
    }

    if settings.refinement.provider == CompletionProvider::Anthropic {
        results.push(check_env_key(
            "ANTHROPIC_API_KEY",
            std::env::var("ANTHROPIC_API_KEY").ok(),
            true,
            "needed for refinement with Anthropic",
        ));
    }

    results
}

fn check_env_key(name: &str, value: Option<String>, required: bool, why: &str) -> CheckResult {
    let hint = format!("Set with: export {}='...' ({})", name, why);
    match value.map(|v| v.trim().to_string()) {
        Some(key) if key.len() > 12 => CheckResult::ok(name, &format!("configured ({})", mask(&key))),
        Some(key) if !key.is_empty() => {
            CheckResult::warning(name, "set but looks too short", &hint)
        }
        _ if required => CheckResult::error(name, "not set", &hint),
        _ => CheckResult::warning(name, "not set", &hint),
    }
}

/// First and last four characters of a key.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn check_storage(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let data_dir = settings.data_dir();
    if data_dir.exists() {
        results.push(CheckResult::ok("Data directory", &format!("{}", data_dir.display())));
    } else {
        results.push(CheckResult::warning(
            "Data directory",
            &format!("{} (will be created)", data_dir.display()),
            "Directory will be created on first use",
        ));
    }

    let db_path = settings.sqlite_path();
    if db_path.exists() {
        let size = std::fs::metadata(&db_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        results.push(CheckResult::ok(
            "Episode database",
            &format!("{} ({})", db_path.display(), size),
        ));
    } else {
        results.push(CheckResult::warning(
            "Episode database",
            &format!("{} (not created yet)", db_path.display()),
            "Database will be created when the first episode is added",
        ));
    }

    results
}

fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: podtekst config edit",
        )
    }
}

fn check_settings(settings: &Settings) -> CheckResult {
    match settings.validate() {
        Ok(()) => CheckResult::ok(
            "Pipeline",
            &format!(
                "{} recognition, {} refinement with {} ({}s chunks x{})",
                settings.transcription.backend,
                settings.refinement.provider,
                settings.refinement.model,
                settings.refinement.chunk_duration_seconds,
                settings.refinement.max_concurrent_chunks
            ),
        ),
        Err(e) => CheckResult::error("Pipeline", &e.to_string(), "Fix with: podtekst config edit"),
    }
}

fn check_prompts(settings: &Settings) -> CheckResult {
    let Some(dir) = settings.prompts.custom_dir.as_deref() else {
        return CheckResult::ok("Prompts", "built-in defaults");
    };
    match Prompts::load(Some(dir), Some(&settings.prompts.variables)) {
        Ok(_) => CheckResult::ok("Prompts", &format!("custom ({})", dir)),
        Err(e) => CheckResult::error(
            "Prompts",
            &format!("failed to load: {}", e),
            "Check refine.toml and summary.toml in the custom prompt directory",
        ),
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_env_key() {
        let ok = check_env_key("X", Some("r8_abcdefghijklmnop".to_string()), true, "why");
        assert_eq!(ok.status, CheckStatus::Ok);
        assert_eq!(ok.message, "configured (r8_a...mnop)");

        let missing = check_env_key("X", None, true, "why");
        assert_eq!(missing.status, CheckStatus::Error);

        let optional = check_env_key("X", Some("  ".to_string()), false, "why");
        assert_eq!(optional.status, CheckStatus::Warning);
    }

    #[test]
    fn test_keys_follow_configured_backends() {
        let mut settings = Settings::default();
        settings.transcription.backend = AsrBackend::WhisperX;
        settings.refinement.provider = CompletionProvider::Anthropic;

        let names: Vec<String> = check_api_keys(&settings).into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["REPLICATE_API_TOKEN", "HUGGINGFACE_API_KEY", "ANTHROPIC_API_KEY"]
        );
    }

    #[test]
    fn test_invalid_settings_reported() {
        let mut settings = Settings::default();
        settings.refinement.max_concurrent_chunks = 0;
        assert_eq!(check_settings(&settings).status, CheckStatus::Error);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }
}
