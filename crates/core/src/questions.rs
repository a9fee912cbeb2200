//! Exam Question Generation
//!
//! Generates academic exam questions (EQF level 6–7, German) for teacher
//! education from a plain-text source excerpt. The generator reuses the
//! [`TurnExecutor`] boundary with a one-shot system/user exchange.

use crate::{
    llm_client::{CompletionSettings, ProviderError, TurnExecutor},
    session::Turn,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{info, warn};

/// Characters of source text forwarded to the model.
pub const SOURCE_EXCERPT_CHARS: usize = 4000;
/// Fragments this short or shorter are dropped from the reply.
pub const MIN_QUESTION_CHARS: usize = 20;
pub const MAX_QUESTION_COUNT: u32 = 50;
/// Count for a topic outside [`DEFAULT_TOPICS`] when none is given.
pub const FALLBACK_QUESTION_COUNT: u32 = 5;

const TEMPERATURE: f32 = 0.4;
const MAX_TOKENS: u32 = 1800;

#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("Invalid question request: {0}")]
    Validation(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFormat {
    #[default]
    Mixed,
    Open,
    MultipleChoice,
    CaseBased,
}

impl QuestionFormat {
    /// Extra prompt sentence constraining the format. Empty for `Mixed`.
    fn instruction(self) -> &'static str {
        match self {
            QuestionFormat::Mixed => "",
            QuestionFormat::Open => "Es sollen ausschließlich offene Fragen sein.",
            QuestionFormat::MultipleChoice => {
                "Es sollen ausschließlich Multiple-Choice-Fragen mit je vier Antwortmöglichkeiten und einer richtigen Antwort sein."
            }
            QuestionFormat::CaseBased => {
                "Die Fragen sollen auf kurzen Unterrichts- oder Alltagssituationen basieren (Fallvignetten)."
            }
        }
    }
}

impl fmt::Display for QuestionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionFormat::Mixed => write!(f, "mixed"),
            QuestionFormat::Open => write!(f, "open"),
            QuestionFormat::MultipleChoice => write!(f, "multiple_choice"),
            QuestionFormat::CaseBased => write!(f, "case_based"),
        }
    }
}

impl FromStr for QuestionFormat {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "mixed" => Ok(QuestionFormat::Mixed),
            "open" => Ok(QuestionFormat::Open),
            "multiple_choice" | "mc" => Ok(QuestionFormat::MultipleChoice),
            "case_based" => Ok(QuestionFormat::CaseBased),
            other => Err(QuestionError::Validation(format!(
                "unknown question format '{other}'"
            ))),
        }
    }
}

/// A topic area of the teacher-education module with its default question count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicSpec {
    pub title: &'static str,
    pub default_count: u32,
}

pub const DEFAULT_TOPICS: [TopicSpec; 5] = [
    TopicSpec {
        title: "Teil 1: Arbeiten in multiprofessionellen Teams / Ganztagsschule",
        default_count: 8,
    },
    TopicSpec {
        title: "Teil 2: Bildung und Ungleichheit",
        default_count: 8,
    },
    TopicSpec {
        title: "Teil 3: INTER_A",
        default_count: 5,
    },
    TopicSpec {
        title: "Teil 4: Interdisziplinäres Lernen",
        default_count: 8,
    },
    TopicSpec {
        title: "Teil 5: Kommunikation und kommunikative Kompetenzen",
        default_count: 8,
    },
];

/// Topics and counts for one generation run.
///
/// Without a topic every default topic is planned with its own count. A
/// given topic keeps the catalogue count when it is one of the defaults.
/// An explicit `count` overrides both.
pub fn plan_topics(topic: Option<&str>, count: Option<u32>) -> Vec<(String, u32)> {
    match topic.map(str::trim) {
        None => DEFAULT_TOPICS
            .iter()
            .map(|t| (t.title.to_string(), count.unwrap_or(t.default_count)))
            .collect(),
        Some(topic) => {
            let default = DEFAULT_TOPICS
                .iter()
                .find(|t| t.title == topic)
                .map_or(FALLBACK_QUESTION_COUNT, |t| t.default_count);
            vec![(topic.to_string(), count.unwrap_or(default))]
        }
    }
}

/// Joins several source documents into one text, separated by blank lines.
pub fn join_sources<S: AsRef<str>>(sources: &[S]) -> String {
    sources
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub source_text: String,
    pub topic: String,
    pub count: u32,
    #[serde(default)]
    pub format: QuestionFormat,
}

impl QuestionRequest {
    fn validate(&self) -> Result<(), QuestionError> {
        if self.source_text.trim().is_empty() {
            return Err(QuestionError::Validation(
                "source text must not be empty".into(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(QuestionError::Validation("topic must not be empty".into()));
        }
        if !(1..=MAX_QUESTION_COUNT).contains(&self.count) {
            return Err(QuestionError::Validation(format!(
                "count must be between 1 and {MAX_QUESTION_COUNT}, got {}",
                self.count
            )));
        }
        Ok(())
    }
}

/// Result of one topic in a multi-topic run.
#[derive(Debug)]
pub struct TopicOutcome {
    pub topic: String,
    pub result: Result<Vec<String>, QuestionError>,
}

pub struct QuestionGenerator {
    executor: Arc<dyn TurnExecutor>,
    settings: CompletionSettings,
}

impl QuestionGenerator {
    /// Uses `model` with the generator's fixed sampling parameters.
    pub fn new(executor: Arc<dyn TurnExecutor>, model: impl Into<String>) -> Self {
        Self {
            executor,
            settings: CompletionSettings {
                model: model.into(),
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            },
        }
    }

    pub async fn generate(&self, request: &QuestionRequest) -> Result<Vec<String>, QuestionError> {
        request.validate()?;
        let topic = request.topic.trim();

        let turns = [
            Turn::system(system_prompt(topic)),
            Turn::user(user_prompt(request)),
        ];
        let reply = self.executor.complete(&turns, &self.settings).await?;
        let questions = split_questions(&reply);

        info!(topic, requested = request.count, generated = questions.len(), "Questions generated");
        Ok(questions)
    }

    /// Generates questions for each planned topic in turn.
    ///
    /// A failing topic is recorded in its outcome and the run moves on.
    pub async fn generate_all(
        &self,
        source_text: &str,
        topics: &[(String, u32)],
        format: QuestionFormat,
    ) -> Vec<TopicOutcome> {
        let mut outcomes = Vec::with_capacity(topics.len());
        for (topic, count) in topics {
            let request = QuestionRequest {
                source_text: source_text.to_string(),
                topic: topic.clone(),
                count: *count,
                format,
            };
            let result = self.generate(&request).await;
            if let Err(e) = &result {
                warn!(topic = %topic, error = %e, "Question generation failed for topic");
            }
            outcomes.push(TopicOutcome {
                topic: topic.trim().to_string(),
                result,
            });
        }
        outcomes
    }
}

fn system_prompt(topic: &str) -> String {
    format!(
        "Du bist ein Bildungsexperte, der Fragen auf EQF-Niveau 6–7 erstellt. \
         Berücksichtige relevante Bildungstheorien, reale Unterrichtssituationen und \
         eine wissenschaftliche Tiefe. Verwende eine akademische Sprache auf Deutsch. \
         Jede Frage muss thematisch zum folgenden Bereich passen: '{topic}'."
    )
}

fn user_prompt(request: &QuestionRequest) -> String {
    format!(
        "Generiere bitte {count} akademische Prüfungsfragen (offen oder MC) zum Thema '{topic}'. \
         {format} \
         Die Fragen sollen auf Deutsch sein, keine Duplikate enthalten und das Antwortoptionenformat \
         dem in den Beispielprüfungen entsprechen (z.B. Anzahl der Antwortmöglichkeiten). \
         Verwende den folgenden deutschen Inhalt zur Inspiration:\n\n\
         {excerpt}\n\n\
         Die Fragen sollen geeignet für Lehramtsstudierende auf Master-Niveau sein, Theorie und Praxis verbinden \
         und kritisch-reflexives Denken fördern.",
        count = request.count,
        topic = request.topic.trim(),
        format = request.format.instruction(),
        excerpt = excerpt(&request.source_text, SOURCE_EXCERPT_CHARS),
    )
}

/// The first `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Splits a model reply on blank lines into individual questions.
pub fn split_questions(reply: &str) -> Vec<String> {
    reply
        .trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|q| q.chars().count() > MIN_QUESTION_CHARS)
        .map(String::from)
        .collect()
}

/// Plain-text export, one numbered block per question.
pub fn render_export(topic: &str, questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{topic} - Frage {}:\n{}\n", i + 1, q.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Export of every successful topic in a run; empty when nothing was generated.
pub fn render_batch_export(outcomes: &[TopicOutcome]) -> String {
    outcomes
        .iter()
        .filter_map(|o| match &o.result {
            Ok(questions) if !questions.is_empty() => Some(render_export(&o.topic, questions)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
