//! Few-shot intro detection: classifies whether a message is a
//! self-introduction by completing a prompt built from a CSV example set.

use crate::completion::CompletionRequest;
use crate::context::Context;
use anyhow::{anyhow, Result};

/// Character budget for the rendered examples in the few-shot prompt.
const EXAMPLE_BUDGET_CHARS: usize = 300;

const PROMPT_PREFIX: &str = "Predict whether or not a message is an introduction.";

/// One labeled example from the CSV (`message,class` columns, class is
/// `true`/`false`).
#[derive(Clone, serde::Deserialize)]
pub struct IntroExample {
    pub message: String,
    pub class: String,
}

/// Intro classifier.  The example set is loaded once at startup and read-only
/// afterwards.
pub struct IntroDetector {
    examples: Vec<IntroExample>,
}

impl IntroDetector {
    /// Load the example set.  CSV parsing is file I/O, so it runs on the
    /// blocking pool rather than the event loop.
    pub async fn load(path: &str) -> Result<Self> {
        let path = path.to_owned();
        let examples = tokio::task::spawn_blocking(move || -> Result<Vec<IntroExample>> {
            let mut reader = csv::Reader::from_path(&path)
                .map_err(|e| anyhow!("Could not open intro examples at `{}`: {}", path, e))?;
            let mut examples = Vec::new();
            for record in reader.deserialize() {
                let example: IntroExample = record
                    .map_err(|e| anyhow!("Could not parse intro example in `{}`: {}", path, e))?;
                examples.push(example);
            }
            Ok(examples)
        })
        .await??;

        if examples.is_empty() {
            return Err(anyhow!("Intro example set is empty"));
        }

        Ok(Self { examples })
    }

    fn render_example(example: &IntroExample) -> String {
        format!("message: {}\nclass: {}\n", example.message, example.class)
    }

    /// Few-shot prompt: fixed prefix, as many examples as fit the character
    /// budget (in order), then the input with an open `class:` line for the
    /// model to complete.
    pub fn build_prompt(&self, input: &str) -> String {
        let mut sections = vec![PROMPT_PREFIX.to_string()];

        let mut used = 0;
        for example in &self.examples {
            let rendered = Self::render_example(example);
            let rendered_chars = rendered.chars().count();
            if used + rendered_chars > EXAMPLE_BUDGET_CHARS {
                break;
            }
            used += rendered_chars;
            sections.push(rendered);
        }

        sections.push(format!("message: {}\nclass:", input));
        sections.join("\n")
    }

    /// The model answers with the class label; anything that isn't `true` is
    /// a non-introduction.
    pub fn parse_class(response: &str) -> bool {
        response.trim().eq_ignore_ascii_case("true")
    }

    /// Classify `message` through the completion capability, collapsed to a
    /// boolean.
    pub async fn is_intro(&self, ctx: &Context<'_>, message: &str) -> Result<bool> {
        let prompt = self.build_prompt(message);
        let response = CompletionRequest::classification(&ctx.cfg.completion, &prompt)
            .post(&ctx.cfg.completion)
            .await?;
        Ok(Self::parse_class(&response))
    }
}

/// Turn a member's introduction into the retrieval query used to find
/// projects to recommend.
pub fn intro_to_query(intro: &str) -> String {
    format!(
        "What are one or two projects that might be interesting for a user with the following intro: {}? \nPlease explain in a helpful tone.",
        intro
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> IntroDetector {
        IntroDetector {
            examples: vec![
                IntroExample {
                    message: "Hi all, I'm Dana, a data scientist from Berlin!".to_string(),
                    class: "true".to_string(),
                },
                IntroExample {
                    message: "Does anyone know when the next call is?".to_string(),
                    class: "false".to_string(),
                },
            ],
        }
    }

    #[test]
    fn prompt_has_prefix_examples_and_open_class_line() {
        let prompt = detector().build_prompt("Hello, I'm Sam and I work on governance");

        assert!(prompt.starts_with(PROMPT_PREFIX));
        assert!(prompt.contains("message: Hi all, I'm Dana, a data scientist from Berlin!"));
        assert!(prompt.contains("class: true"));
        assert!(prompt.contains("class: false"));
        assert!(prompt.ends_with("message: Hello, I'm Sam and I work on governance\nclass:"));
    }

    #[test]
    fn prompt_examples_respect_length_budget() {
        let long_example = IntroExample {
            message: "x".repeat(EXAMPLE_BUDGET_CHARS),
            class: "true".to_string(),
        };
        let detector = IntroDetector {
            examples: vec![
                IntroExample {
                    message: "Hi, I'm Ana".to_string(),
                    class: "true".to_string(),
                },
                long_example,
            ],
        };

        let prompt = detector.build_prompt("input");
        // First example fits, the oversized one is dropped
        assert!(prompt.contains("Hi, I'm Ana"));
        assert!(!prompt.contains(&"x".repeat(EXAMPLE_BUDGET_CHARS)));
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        // 200 two-byte chars render well inside the character budget even
        // though the example is over the budget in bytes
        let detector = IntroDetector {
            examples: vec![IntroExample {
                message: "é".repeat(200),
                class: "true".to_string(),
            }],
        };

        let prompt = detector.build_prompt("input");
        assert!(prompt.contains(&"é".repeat(200)));
    }

    #[test]
    fn class_parsing_is_forgiving_about_case_and_whitespace() {
        assert!(IntroDetector::parse_class("true"));
        assert!(IntroDetector::parse_class(" True\n"));
        assert!(IntroDetector::parse_class("TRUE"));
        assert!(!IntroDetector::parse_class("false"));
        assert!(!IntroDetector::parse_class("probably"));
        assert!(!IntroDetector::parse_class(""));
    }

    #[test]
    fn intro_query_embeds_the_intro() {
        let query = intro_to_query("I'm Sam, I like DAOs");
        assert!(query.contains("I'm Sam, I like DAOs"));
        assert!(query.starts_with("What are one or two projects"));
    }

    #[tokio::test]
    async fn load_parses_csv_and_rejects_empty() {
        let dir = std::env::temp_dir();
        let path = dir.join("leobot_intro_examples_test.csv");
        tokio::fs::write(&path, "message,class\nHi I'm Dana,true\nwhen is the call?,false\n")
            .await
            .unwrap();

        let detector = IntroDetector::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(detector.examples.len(), 2);
        assert_eq!(detector.examples[0].class, "true");

        let empty = dir.join("leobot_intro_examples_empty.csv");
        tokio::fs::write(&empty, "message,class\n").await.unwrap();
        assert!(IntroDetector::load(empty.to_str().unwrap()).await.is_err());
    }
}
