//! Quiz-set entities.

use serde::{Deserialize, Serialize};

/// Quiz set as returned by the quiz-set source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizSetEntity {
    /// Display title copied into the room when a round starts.
    pub title: String,
    /// Every quiz of the set.
    pub quiz_list: Vec<QuizEntity>,
}

/// One question of a quiz set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizEntity {
    /// Identifier within the source.
    pub id: i64,
    /// Question text.
    pub quiz: String,
    /// Answer time limit in seconds.
    pub limit_time: u32,
    /// Choices in display order.
    pub choice_list: Vec<ChoiceEntity>,
}

/// One choice of a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceEntity {
    /// 1-based display order, also used as the answer reference.
    pub order: u32,
    /// Displayed text.
    pub content: String,
    /// Whether this choice is the correct one.
    pub is_answer: bool,
}

impl QuizEntity {
    /// Order of the first choice flagged as the answer.
    pub fn answer_order(&self) -> Option<u32> {
        self.choice_list
            .iter()
            .find(|choice| choice.is_answer)
            .map(|choice| choice.order)
    }
}
