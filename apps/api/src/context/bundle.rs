use serde::Serialize;

/// Grounding text compiled from the resume and the profile record.
///
/// Immutable once built: a new bundle is assembled on every refresh. An empty
/// `resume_text` means "no context yet" and is not a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    resume_text: String,
    linkedin_about: String,
    github_url: String,
}

impl ContextBundle {
    pub fn new(
        resume_text: impl Into<String>,
        linkedin_about: impl Into<String>,
        github_url: impl Into<String>,
    ) -> Self {
        Self {
            resume_text: resume_text.into(),
            linkedin_about: linkedin_about.into(),
            github_url: github_url.into(),
        }
    }

    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }

    pub fn linkedin_about(&self) -> &str {
        &self.linkedin_about
    }

    pub fn github_url(&self) -> &str {
        &self.github_url
    }

    pub fn has_resume(&self) -> bool {
        !self.resume_text.trim().is_empty()
    }

    /// Serializes the bundle under fixed section labels. Empty fields are omitted.
    pub fn to_preamble(&self) -> String {
        let mut preamble = String::from("--- CANDIDATE'S PROFILE CONTEXT ---\n\n");
        let sections = [
            ("[RESUME CONTENT]", &self.resume_text),
            ("[LINKEDIN 'ABOUT' SECTION]", &self.linkedin_about),
            ("[GITHUB PROFILE URL]", &self.github_url),
        ];
        for (label, value) in sections {
            if !value.is_empty() {
                preamble.push_str(&format!("{label}:\n{value}\n\n"));
            }
        }
        preamble.push_str("--- END OF CONTEXT ---");
        preamble
    }
}
