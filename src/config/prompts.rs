//! Prompt templates for Podtekst.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    /// Prompts for cleaning one transcript chunk into paragraphs.
    pub refine: RefinePrompts,
    /// Prompts for the summary, chapter and speaker-name call.
    pub summary: SummaryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for chunk refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinePrompts {
    pub system: String,
    pub user: String,
    /// Appended as {{speaker_rules}} when segments carry speaker labels.
    pub speaker_rules: String,
}

impl Default for RefinePrompts {
    fn default() -> Self {
        Self {
            system: "You are a careful transcript editor. You answer with JSON only.".to_string(),
            user: r#"You are processing a podcast transcript. Clean up this transcript chunk and group it into natural paragraphs, aiming for a good reading experience.
{{episode_context}}
For each paragraph, provide the start and end timestamps (in seconds) and the cleaned text.

Rules:
- Remove filler words (um, uh, like, you know) unless they add meaning
- Fix obvious speech recognition errors
- Preserve the speaker's meaning and tone, using their specific words where possible
- Group related sentences into paragraphs (2-5 sentences each). Prefer shorter paragraphs, around 30-50 words.
- Keep timestamps accurate{{speaker_rules}}

Respond with a JSON object of the form {"paragraphs": [{"start": 0.0, "end": 12.5, "text": "...", "speaker": "SPEAKER_00"}]}.

Transcript chunk:
{{transcript}}"#
                .to_string(),
            speaker_rules: r#"
- Each paragraph MUST have a "speaker" field with the speaker label (e.g. "SPEAKER_00")
- NEVER combine text from different speakers into one paragraph. A speaker change always means a new paragraph
- Preserve the speaker label exactly as given"#
                .to_string(),
        }
    }
}

/// Prompts for the summary stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub system: String,
    pub user: String,
    /// Appended as {{speaker_instructions}} when paragraphs carry speaker labels.
    pub speaker_instructions: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            system: "You are a podcast producer writing show notes. You answer with JSON only."
                .to_string(),
            user: r#"Here is a cleaned podcast transcript. Generate a summary, chapter titles, and speaker names.
{{episode_context}}
Transcript:
{{transcript}}

For the summary: write 1-2 short, punchy paragraphs summarizing the podcast episode.

For chapter titles:
- Create chapter titles wherever the topic shifts. Approximately once every 2-8 minutes, but longer is fine.
- Titles should be catchy and descriptive.
- Sentence fragments and questions are good. Avoid sounding like AI slop.
- Use sentence case: only capitalize the first letter, except for proper nouns.
- Chapter timestamps should correspond to where that topic begins, in seconds.
{{speaker_instructions}}
Respond with a JSON object of the form {"summary": "...", "chapters": [{"title": "...", "timestamp": 0.0}], "speaker_names": []}."#
                .to_string(),
            speaker_instructions: r#"
For speaker_names: The transcript has speaker labels like SPEAKER_00, SPEAKER_01, etc.
Infer the real name of each speaker from context (introductions, references to each other).
Return an array where index 0 is SPEAKER_00's name, index 1 is SPEAKER_01's name, etc.
If you cannot determine a name, use the raw label (e.g. "SPEAKER_00").
"#
            .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let refine_path = custom_path.join("refine.toml");
            if refine_path.exists() {
                let content = std::fs::read_to_string(&refine_path)?;
                prompts.refine = toml::from_str(&content)?;
            }

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
