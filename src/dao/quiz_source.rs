//! Quiz-set lookup used when a round starts.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{ChoiceEntity, QuizEntity, QuizSetEntity},
    storage::StorageResult,
};

/// Identifier rooms use to select the built-in quiz set.
pub const DEFAULT_QUIZ_SET_ID: i64 = -1;

/// Read-only access to persisted quiz sets.
pub trait QuizSetSource: Send + Sync {
    /// Quiz set stored under `id`, `None` when unknown.
    fn get_quiz_set(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<QuizSetEntity>>>;
}

/// Quiz sets held in memory, seeded with the built-in default set.
#[derive(Clone, Default)]
pub struct StaticQuizSource {
    sets: Arc<DashMap<i64, QuizSetEntity>>,
}

impl StaticQuizSource {
    /// Source holding only the default set.
    pub fn new() -> Self {
        let source = Self::default();
        source.insert(DEFAULT_QUIZ_SET_ID, default_quiz_set());
        source
    }

    /// Add or replace a set.
    pub fn insert(&self, id: i64, set: QuizSetEntity) {
        self.sets.insert(id, set);
    }
}

impl QuizSetSource for StaticQuizSource {
    fn get_quiz_set(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<QuizSetEntity>>> {
        let found = self.sets.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }
}

fn quiz(id: i64, question: &str, limit_time: u32, choices: &[&str], answer: u32) -> QuizEntity {
    QuizEntity {
        id,
        quiz: question.to_string(),
        limit_time,
        choice_list: choices
            .iter()
            .zip(1u32..)
            .map(|(content, order)| ChoiceEntity {
                order,
                content: content.to_string(),
                is_answer: order == answer,
            })
            .collect(),
    }
}

/// Quiz set played when the host never picked one.
pub fn default_quiz_set() -> QuizSetEntity {
    QuizSetEntity {
        title: "Default quiz set".to_string(),
        quiz_list: vec![
            quiz(1, "Which planet is closest to the sun?", 10, &["Venus", "Mercury", "Mars"], 2),
            quiz(2, "How many sides does a hexagon have?", 10, &["5", "6", "8", "7"], 2),
            quiz(3, "What is the chemical symbol for gold?", 10, &["Au", "Ag", "Gd"], 1),
            quiz(4, "Which ocean is the largest?", 15, &["Atlantic", "Indian", "Pacific"], 3),
            quiz(5, "What is 7 x 8?", 10, &["54", "56", "58", "64"], 2),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_one_answer_per_quiz() {
        let set = default_quiz_set();
        assert!(!set.quiz_list.is_empty());
        for quiz in &set.quiz_list {
            let answers = quiz.choice_list.iter().filter(|c| c.is_answer).count();
            assert_eq!(answers, 1, "quiz {} must have exactly one answer", quiz.id);
            assert!(quiz.answer_order().is_some());
        }
    }

    #[tokio::test]
    async fn unknown_set_resolves_to_none() {
        let source = StaticQuizSource::new();
        assert!(source.get_quiz_set(DEFAULT_QUIZ_SET_ID).await.unwrap().is_some());
        assert!(source.get_quiz_set(42).await.unwrap().is_none());
    }
}
