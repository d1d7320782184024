// src/services/sampler.rs

use std::collections::HashSet;
use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};

use crate::{
    error::AppError,
    models::question::{Question, QuestionFilter},
    repository::QuestionRepository,
};

/// Draws random questions without materializing the matching table.
pub struct QuestionSampler {
    questions: Arc<dyn QuestionRepository>,
}

impl QuestionSampler {
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Returns at most `count` distinct questions matching `filter`, in random order.
    ///
    /// * Small pools (`total <= count`) are read whole and shuffled.
    /// * Otherwise `count` distinct offsets are drawn by rejection sampling and each
    ///   row is read by offset, one query per question.
    ///
    /// Fewer results than requested mean the pool is too small; the caller decides
    /// whether that is fatal.
    pub async fn sample(
        &self,
        count: usize,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, AppError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let total = self.questions.count_questions(filter).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        if total <= count as u64 {
            let mut all = self.questions.list_questions(filter).await?;
            all.shuffle(&mut rand::rng());
            return Ok(all);
        }

        let offsets = random_offsets(count, total);

        let mut seen = HashSet::with_capacity(count);
        let mut picked = Vec::with_capacity(count);
        for offset in offsets {
            // A row deleted between the count and this read shifts offsets;
            // skipping misses and duplicates keeps the result unique.
            if let Some(question) = self.questions.question_at_offset(filter, offset).await? {
                if seen.insert(question.id) {
                    picked.push(question);
                }
            }
        }

        tracing::debug!(requested = count, total, picked = picked.len(), "Sampled questions");
        Ok(picked)
    }
}

/// `count` distinct values in `[0, total)`, in draw order. Requires `count < total`.
fn random_offsets(count: usize, total: u64) -> Vec<u64> {
    let mut rng = rand::rng();
    let mut seen = HashSet::with_capacity(count);
    let mut offsets = Vec::with_capacity(count);
    while offsets.len() < count {
        let offset = rng.random_range(0..total);
        if seen.insert(offset) {
            offsets.push(offset);
        }
    }
    offsets
}
