// Prompt rendering and reply parsing for the LLM-backed routes

use handlebars::Handlebars;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::{CollaboratorError, LlmClient};

lazy_static! {
    static ref CODE_BLOCK: Regex = Regex::new(r"(?s)```[a-zA-Z]*[ \t]*\r?\n(.*?)```").unwrap();
}

const TESTS_TEMPLATE: &str = r#"You are {{persona}}.
Write unit tests for the JavaScript code below.
{{#if function_name}}The function under test is `{{function_name}}`; it is already in scope, do not import or redefine it.
{{else}}The functions under test are already in scope; do not import or redefine them.
{{/if}}
{{focus}}

Rules:
- Use only describe, test, it, beforeEach, afterEach, beforeAll, afterAll and expect.
- Allowed matchers: toBe, toEqual, toStrictEqual, toBeTruthy, toBeFalsy, toBeNull, toBeUndefined, toBeDefined, toBeNaN, toContain, toHaveLength, toHaveProperty, toMatch, toBeInstanceOf, toBeGreaterThan, toBeGreaterThanOrEqual, toBeLessThan, toBeLessThanOrEqual, toBeCloseTo, toThrow, and .not before any of them.
- Tests must be synchronous: no async functions, promises, timers or done callbacks.
- Reply with a single ```javascript code block and nothing else.

Code:
```javascript
{{code}}
```
"#;

const REFACTOR_TEMPLATE: &str = r#"You are a senior JavaScript engineer.
Refactor the code below for readability and correctness without changing its behaviour.
Reply with the refactored code in a single ```javascript code block, followed by a short list of the changes you made.

Code:
```javascript
{{code}}
```
"#;

const EXPLAIN_TEMPLATE: &str = r#"You are a patient JavaScript mentor.
Explain what the code below does, step by step, in plain language. Point out any bugs or edge cases it does not handle.

Code:
```javascript
{{code}}
```
"#;

/// Voice used for test generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    Engineer,
    Adversary,
    Minimalist,
}

impl Personality {
    /// Parse a personality from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Personality> {
        match s.trim().to_lowercase().as_str() {
            "engineer" => Some(Personality::Engineer),
            "adversary" => Some(Personality::Adversary),
            "minimalist" => Some(Personality::Minimalist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Personality::Engineer => "engineer",
            Personality::Adversary => "adversary",
            Personality::Minimalist => "minimalist",
        }
    }

    fn persona(&self) -> &'static str {
        match self {
            Personality::Engineer => "a meticulous senior software engineer",
            Personality::Adversary => "an adversarial QA engineer trying to break this code",
            Personality::Minimalist => "a pragmatic engineer who values small, focused test suites",
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            Personality::Engineer => {
                "Cover typical inputs, boundary values and every documented error path."
            }
            Personality::Adversary => {
                "Hunt for edge cases: empty and huge inputs, wrong types, negative numbers, NaN, undefined and unusual strings."
            }
            Personality::Minimalist => "Write at most five tests covering the most important behaviour.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Refactor,
    Explain,
}

impl AnalysisMode {
    pub fn from_str(s: &str) -> Option<AnalysisMode> {
        match s.trim().to_lowercase().as_str() {
            "refactor" => Some(AnalysisMode::Refactor),
            "explain" => Some(AnalysisMode::Explain),
            _ => None,
        }
    }

    fn template(&self) -> &'static str {
        match self {
            AnalysisMode::Refactor => "refactor",
            AnalysisMode::Explain => "explain",
        }
    }
}

/// Reply to an `/analyze` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

/// Renders prompts, calls the LLM and pulls code out of its replies
#[derive(Clone)]
pub struct CodeAssistant {
    llm: Arc<dyn LlmClient>,
    templates: Arc<Handlebars<'static>>,
}

impl CodeAssistant {
    pub fn new(llm: Arc<dyn LlmClient>) -> Result<Self, CollaboratorError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates.register_escape_fn(handlebars::no_escape);

        for (name, source) in [
            ("tests", TESTS_TEMPLATE),
            ("refactor", REFACTOR_TEMPLATE),
            ("explain", EXPLAIN_TEMPLATE),
        ] {
            templates
                .register_template_string(name, source)
                .map_err(|e| CollaboratorError::Template(e.to_string()))?;
        }

        Ok(Self {
            llm,
            templates: Arc::new(templates),
        })
    }

    pub fn provider(&self) -> &'static str {
        self.llm.name()
    }

    /// Ask the LLM for tests and return the bare test source
    pub async fn generate_tests(
        &self,
        code: &str,
        personality: Personality,
        function_name: &str,
    ) -> Result<String, CollaboratorError> {
        let prompt = self.render(
            "tests",
            &json!({
                "persona": personality.persona(),
                "focus": personality.focus(),
                "function_name": function_name,
                "code": code,
            }),
        )?;

        debug!(personality = personality.as_str(), "Requesting generated tests");
        let reply = self.llm.complete(&prompt).await?;
        extract_code_block(&reply).ok_or(CollaboratorError::EmptyReply {
            service: self.llm.name(),
        })
    }

    pub async fn analyze(&self, code: &str, mode: AnalysisMode) -> Result<Analysis, CollaboratorError> {
        let prompt = self.render(mode.template(), &json!({ "code": code }))?;
        let reply = self.llm.complete(&prompt).await?;

        match mode {
            AnalysisMode::Explain => {
                let content = reply.trim().to_string();
                if content.is_empty() {
                    return Err(CollaboratorError::EmptyReply {
                        service: self.llm.name(),
                    });
                }
                Ok(Analysis {
                    content,
                    analysis: None,
                })
            }
            AnalysisMode::Refactor => {
                let content = extract_code_block(&reply).ok_or(CollaboratorError::EmptyReply {
                    service: self.llm.name(),
                })?;
                let remainder = CODE_BLOCK.replace(&reply, "").trim().to_string();
                Ok(Analysis {
                    content,
                    analysis: if remainder.is_empty() { None } else { Some(remainder) },
                })
            }
        }
    }

    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, CollaboratorError> {
        self.templates
            .render(template, data)
            .map_err(|e| CollaboratorError::Template(e.to_string()))
    }
}

/// First fenced code block of a reply, or the whole reply when unfenced
pub fn extract_code_block(reply: &str) -> Option<String> {
    let code = match CODE_BLOCK.captures(reply) {
        Some(captures) => captures[1].trim().to_string(),
        None => reply.trim().to_string(),
    };
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
