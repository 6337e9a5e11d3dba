use crate::config::{ApiMode, ModelSettings};

/// How a job's prompt is presented to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptFormat {
    /// Raw completion: the prompt is forwarded verbatim
    Completion,
    /// Chat completion: the prompt becomes the user turn of a ChatML conversation
    Chat { system_prompt: Option<String> },
}

impl PromptFormat {
    pub fn from_settings(model: &ModelSettings) -> Self {
        match model.api {
            ApiMode::Completion => PromptFormat::Completion,
            ApiMode::Chat => PromptFormat::Chat {
                system_prompt: model.system_prompt.clone(),
            },
        }
    }

    /// Renders the text that is fed to the model for `prompt`.
    pub fn render(&self, prompt: &str) -> String {
        match self {
            PromptFormat::Completion => prompt.to_string(),
            PromptFormat::Chat { system_prompt } => {
                let mut rendered = String::new();
                if let Some(system) = system_prompt.as_deref().filter(|s| !s.is_empty()) {
                    push_turn(&mut rendered, "system", system);
                }
                push_turn(&mut rendered, "user", prompt);
                rendered.push_str("<|im_start|>assistant\n");
                rendered
            }
        }
    }
}

fn push_turn(out: &mut String, role: &str, content: &str) {
    out.push_str("<|im_start|>");
    out.push_str(role);
    out.push('\n');
    out.push_str(content);
    out.push_str("<|im_end|>\n");
}
