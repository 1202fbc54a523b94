// Prompt text for idea generation.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Placeholder replaced with the complaint text.
pub const COMPLAINT_PLACEHOLDER: &str = "{complaint_text}";

pub const SYSTEM_PROMPT: &str =
    "You are a startup advisor. You respond with a single valid JSON object and nothing else.";

pub const DEFAULT_TEMPLATE: &str = r#"Read the user complaint below and propose one app or startup idea that removes the pain it describes.

Reply with exactly this JSON object and no other text:

{
  "idea": "<the idea in under 35 words>",
  "score_market": <integer 1-10>,
  "score_tech": <integer 1-10>,
  "score_competition": <integer 1-10>,
  "score_monetisation": <integer 1-10>,
  "score_feasibility": <integer 1-10>,
  "score_overall": <integer 1-10>
}

How to score (integers only, 1 = worst, 10 = best):
- market: how many people have this problem and would pay to fix it
- tech: how achievable the build is for a small team
- competition: how open the space is (10 = almost no competitors)
- monetisation: how clear the path to revenue is
- feasibility: how likely a small team is to ship and sustain it
- overall: your judgement across all of the above

Complaint:
{complaint_text}"#;

/// The template used for a run: the file at `path` if given, else the
/// built-in one. A custom template must contain the placeholder.
pub fn load_template(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_TEMPLATE.to_string());
    };
    let template = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
    if !template.contains(COMPLAINT_PLACEHOLDER) {
        bail!(
            "prompt template {} does not contain {}",
            path.display(),
            COMPLAINT_PLACEHOLDER
        );
    }
    Ok(template)
}

/// Substitutes the complaint into the template. Braces elsewhere in the
/// template are left alone.
pub fn render(template: &str, complaint: &str) -> String {
    template.replace(COMPLAINT_PLACEHOLDER, complaint.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn render_keeps_json_braces() {
        let prompt = render(DEFAULT_TEMPLATE, "  Battery dies by noon  ");
        assert!(prompt.ends_with("Battery dies by noon"));
        assert!(prompt.contains("\"score_overall\""));
        assert!(!prompt.contains(COMPLAINT_PLACEHOLDER));
    }

    #[test]
    fn custom_template_requires_placeholder() {
        let mut good = tempfile::NamedTempFile::new().unwrap();
        write!(good, "Idea for: {{complaint_text}}").unwrap();
        assert_eq!(
            load_template(Some(good.path())).unwrap(),
            "Idea for: {complaint_text}"
        );

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "no placeholder here").unwrap();
        assert!(load_template(Some(bad.path())).is_err());
    }

    #[test]
    fn default_template_when_no_path() {
        assert_eq!(load_template(None).unwrap(), DEFAULT_TEMPLATE);
    }
}
