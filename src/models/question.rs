// src/models/question.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The five subject areas of the question bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    VerbalAbility,
    NumericalAbility,
    AnalyticalAbility,
    GeneralInformation,
    ClericalAbility,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::VerbalAbility,
        Category::NumericalAbility,
        Category::AnalyticalAbility,
        Category::GeneralInformation,
        Category::ClericalAbility,
    ];

    /// Column value in the `questions` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::VerbalAbility => "VERBAL_ABILITY",
            Category::NumericalAbility => "NUMERICAL_ABILITY",
            Category::AnalyticalAbility => "ANALYTICAL_ABILITY",
            Category::GeneralInformation => "GENERAL_INFORMATION",
            Category::ClericalAbility => "CLERICAL_ABILITY",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            other => Err(format!("Unknown difficulty '{}'", other)),
        }
    }
}

/// One labeled choice, e.g. `{ "id": "B", "text": "Quarterly" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// A row of the 'questions' table. Read-only to the exam core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub category: Category,
    pub difficulty: Difficulty,

    /// The text content of the question.
    pub content: String,

    /// Ordered choices, stored as a JSON array in the database.
    pub options: Vec<QuestionOption>,

    /// Id of the correct option.
    pub correct_option_id: String,

    /// Explanation written by the content team.
    pub explanation: Option<String>,

    /// Generated explanation, preferred over `explanation` when present.
    pub ai_explanation: Option<String>,
}

impl Question {
    pub fn is_correct(&self, option_id: &str) -> bool {
        self.correct_option_id == option_id
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    pub fn best_explanation(&self) -> Option<&str> {
        self.ai_explanation
            .as_deref()
            .or(self.explanation.as_deref())
    }
}

/// DTO for sending question to client (excludes answer and explanations).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub category: Category,
    pub difficulty: Difficulty,
    pub content: String,
    pub options: Vec<QuestionOption>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            category: q.category,
            difficulty: q.difficulty,
            content: q.content,
            options: q.options,
        }
    }
}

/// Filters understood by the question sampler. Empty `categories` means any category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionFilter {
    pub categories: Vec<Category>,
    pub difficulty: Option<Difficulty>,
}

impl QuestionFilter {
    pub fn matches(&self, q: &Question) -> bool {
        (self.categories.is_empty() || self.categories.contains(&q.category))
            && self.difficulty.is_none_or(|d| d == q.difficulty)
    }
}
