use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::battle::external::{AnswerOracle, QuestionSource};
use crate::battle::{GenerationError, OracleError};
use crate::config::Config;
use crate::metrics::track_llm_operation;
use crate::models::{Difficulty, Question, QuestionType};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const GENERATION_TEMPERATURE: f32 = 0.7;
const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Loose shape of a generated question; missing fields are filled or the
/// question is dropped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuestion {
    #[serde(rename = "type")]
    kind: Option<QuestionType>,
    question: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    correct_answer: Option<String>,
    #[serde(default)]
    explanation: String,
    difficulty: Option<String>,
}

/// OpenAI chat-completions client used both to write questions and to play
/// the AI opponent.
#[derive(Clone)]
pub struct OpenAiService {
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl OpenAiService {
    pub fn new(config: &Config) -> Self {
        Self {
            http_client: Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            timeout: config.llm_timeout(),
            retry: RetryConfig {
                max_attempts: config.llm_max_attempts as usize,
                base_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(4),
                jitter_max: Some(Duration::from_millis(100)),
            },
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage>, temperature: Option<f32>) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not configured"))?;
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("OpenAI returned error {}: {}", status, error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No content returned from OpenAI"))
    }

    async fn complete_with_retry(
        &self,
        operation: &str,
        messages: impl Fn() -> Vec<ChatMessage>,
        temperature: Option<f32>,
    ) -> Result<String> {
        track_llm_operation(
            operation,
            retry_async_with_config(self.retry.clone(), || {
                self.complete(messages(), temperature)
            }),
        )
        .await
    }
}

#[async_trait]
impl QuestionSource for OpenAiService {
    async fn generate(
        &self,
        difficulty: Difficulty,
        count: u32,
    ) -> Result<Vec<Question>, GenerationError> {
        tracing::info!(
            "Generating {} vocabulary questions at {} difficulty",
            count,
            difficulty
        );

        let content = self
            .complete_with_retry(
                "generate_questions",
                || generation_messages(difficulty, count),
                Some(GENERATION_TEMPERATURE),
            )
            .await
            .map_err(|e| {
                tracing::error!("Question generation failed: {:#}", e);
                GenerationError::Unavailable(format!("{:#}", e))
            })?;

        let questions = parse_generated_questions(&content, difficulty)?;
        tracing::info!("Generated {} questions", questions.len());
        Ok(questions)
    }
}

#[async_trait]
impl AnswerOracle for OpenAiService {
    async fn answer(&self, prompt: &str, options: &[String]) -> Result<String, OracleError> {
        let content = self
            .complete_with_retry("ai_answer", || oracle_messages(prompt, options), None)
            .await
            .map_err(|e| {
                tracing::error!("AI answer request failed: {:#}", e);
                OracleError::Unavailable(format!("{:#}", e))
            })?;

        parse_oracle_answer(&content, options)
    }
}

fn generation_messages(difficulty: Difficulty, count: u32) -> Vec<ChatMessage> {
    let system = format!(
        "You are a vocabulary expert who writes challenging, educational questions about words, \
their meanings and their relationships.\n\
Every question must focus on a different vocabulary word. Never reuse a word across questions.\n\n\
When writing questions at \"{difficulty}\" difficulty:\n\
- Easy: common words most high school students know\n\
- Medium: moderately challenging words a college graduate knows\n\
- Hard: advanced words seen on graduate school entrance exams\n\
- Mixed: a balanced mix of all levels"
    );

    let user = format!(
        "Generate {count} unique vocabulary questions:\n\
- About 60% multiple choice questions on word definitions (type \"mcq\")\n\
- About 40% analogy questions (type \"analogy\") in the form \"WORD1 is to WORD2 as WORD3 is to:\"\n\
- All questions at {difficulty} difficulty\n\
- Exactly 4 options per question\n\
- Include the correct answer and a detailed explanation\n\n\
Respond with a JSON object holding an array named \"questions\". Each question has:\n\
- type: \"mcq\" or \"analogy\"\n\
- question: the question text\n\
- options: array of 4 strings\n\
- correctAnswer: the correct option, exactly as written in options\n\
- explanation: why the answer is correct\n\
- difficulty: \"{difficulty}\""
    );

    vec![
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}

fn oracle_messages(prompt: &str, options: &[String]) -> Vec<ChatMessage> {
    let lettered = options
        .iter()
        .enumerate()
        .map(|(index, option)| match OPTION_LETTERS.get(index) {
            Some(letter) => format!("{}. {}", letter, option),
            None => format!("{}. {}", index + 1, option),
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        ChatMessage {
            role: "system",
            content: "You are answering a vocabulary or analogy question. \
Select the correct answer from the available options."
                .to_string(),
        },
        ChatMessage {
            role: "user",
            content: format!(
                "Answer this question by selecting ONE of the options.\n\n\
Question: {prompt}\n\nOptions:\n{lettered}\n\n\
Respond with a JSON object with a single property \"answer\" holding the exact text \
of your chosen option (not the letter)."
            ),
        },
    ]
}

/// Parses `{"questions": [...]}`. Entries that cannot be read as a question
/// are skipped; a body that is not the expected object is malformed.
pub(crate) fn parse_generated_questions(
    content: &str,
    difficulty: Difficulty,
) -> Result<Vec<Question>, GenerationError> {
    let body: Value = serde_json::from_str(content)
        .map_err(|e| GenerationError::Malformed(format!("response is not JSON: {}", e)))?;
    let entries = body
        .get("questions")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::Malformed("missing \"questions\" array".to_string()))?;

    let questions = entries
        .iter()
        .filter_map(|entry| {
            match serde_json::from_value::<GeneratedQuestion>(entry.clone()) {
                Ok(raw) => into_question(raw, difficulty),
                Err(e) => {
                    tracing::warn!("Skipping unreadable generated question: {}", e);
                    None
                }
            }
        })
        .collect();

    Ok(questions)
}

fn into_question(raw: GeneratedQuestion, difficulty: Difficulty) -> Option<Question> {
    Some(Question {
        id: None,
        kind: raw.kind.unwrap_or(QuestionType::Mcq),
        prompt: raw.question?,
        options: raw.options,
        correct_answer: raw.correct_answer?,
        explanation: raw.explanation,
        difficulty: raw
            .difficulty
            .unwrap_or_else(|| difficulty.as_str().to_string()),
    })
}

/// Reads `{"answer": ...}` and maps it onto one of `options`: exact text
/// first, then ignoring case and surrounding whitespace.
pub(crate) fn parse_oracle_answer(content: &str, options: &[String]) -> Result<String, OracleError> {
    #[derive(Deserialize)]
    struct OracleReply {
        answer: Option<String>,
    }

    let reply: OracleReply = serde_json::from_str(content)
        .map_err(|e| OracleError::Malformed(format!("response is not JSON: {}", e)))?;
    let answer = reply
        .answer
        .ok_or_else(|| OracleError::Malformed("missing \"answer\" field".to_string()))?;

    if let Some(exact) = options.iter().find(|option| **option == answer) {
        return Ok(exact.clone());
    }

    let wanted = answer.trim().to_lowercase();
    options
        .iter()
        .find(|option| option.trim().to_lowercase() == wanted)
        .cloned()
        .ok_or(OracleError::UnknownOption(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        ["Ephemeral", "Lasting", "Ancient", "Sturdy"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn parses_generated_questions_and_fills_difficulty() {
        let content = r#"{"questions": [
            {"type": "analogy", "question": "BIRD is to FLY as FISH is to:",
             "options": ["Swim", "Run", "Crawl", "Walk"], "correctAnswer": "Swim",
             "explanation": "Primary movement."},
            {"type": "mcq", "options": ["a", "b", "c", "d"], "correctAnswer": "a"},
            "not an object"
        ]}"#;

        let questions = parse_generated_questions(content, Difficulty::Easy).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].kind, QuestionType::Analogy);
        assert_eq!(questions[0].difficulty, "easy");
        assert_eq!(questions[0].correct_answer, "Swim");
    }

    #[test]
    fn generation_without_questions_array_is_malformed() {
        let err = parse_generated_questions(r#"{"items": []}"#, Difficulty::Medium).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));

        let err = parse_generated_questions("plain text", Difficulty::Medium).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn oracle_answer_matches_exactly_then_loosely() {
        assert_eq!(
            parse_oracle_answer(r#"{"answer": "Lasting"}"#, &options()).unwrap(),
            "Lasting"
        );
        assert_eq!(
            parse_oracle_answer(r#"{"answer": "  ephemeral "}"#, &options()).unwrap(),
            "Ephemeral"
        );
    }

    #[test]
    fn oracle_answer_outside_options_is_rejected() {
        assert_eq!(
            parse_oracle_answer(r#"{"answer": "B"}"#, &options()),
            Err(OracleError::UnknownOption("B".to_string()))
        );
        assert!(matches!(
            parse_oracle_answer(r#"{"choice": "Lasting"}"#, &options()),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn oracle_prompt_letters_options() {
        let messages = oracle_messages("Which word means short-lived?", &options());
        assert!(messages[1].content.contains("A. Ephemeral"));
        assert!(messages[1].content.contains("D. Sturdy"));
    }

    #[tokio::test]
    async fn missing_api_key_is_unavailable() {
        let config = Config {
            llm_max_attempts: 1,
            ..Config::default()
        };
        let service = OpenAiService::new(&config);

        let err = service.generate(Difficulty::Easy, 3).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));

        let err = service.answer("q", &options()).await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
