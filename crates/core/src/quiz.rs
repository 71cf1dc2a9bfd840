//! Role derivation for the role-selection quiz.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::RoleQuizContent;

/// Raw quiz answers: question id to selected option id.
pub type QuizAnswers = BTreeMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question {question_id} was not answered")]
    Unanswered { question_id: String },

    #[error("question {question_id} has no option {option_id}")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },

    #[error("answer refers to unknown question {question_id}")]
    UnknownQuestion { question_id: String },

    #[error("quiz has no questions")]
    NoQuestions,
}

/// Tallies the roles of the selected options and returns the winner.
///
/// Ties go to the role that appeared first in quiz order.
///
/// # Errors
///
/// Returns `QuizError` if a question is unanswered, an answer names an unknown
/// question, or an option does not exist.
pub fn derive_role(quiz: &RoleQuizContent, answers: &QuizAnswers) -> Result<String, QuizError> {
    if let Some(question_id) = answers
        .keys()
        .find(|id| !quiz.questions.iter().any(|q| &q.id == *id))
    {
        return Err(QuizError::UnknownQuestion {
            question_id: question_id.clone(),
        });
    }

    // (role, votes), kept in first-seen order
    let mut tally: Vec<(&str, u32)> = Vec::new();
    for question in &quiz.questions {
        let option_id = answers
            .get(&question.id)
            .ok_or_else(|| QuizError::Unanswered {
                question_id: question.id.clone(),
            })?;
        let option = question
            .options
            .iter()
            .find(|o| &o.id == option_id)
            .ok_or_else(|| QuizError::UnknownOption {
                question_id: question.id.clone(),
                option_id: option_id.clone(),
            })?;

        match tally.iter_mut().find(|(role, _)| *role == option.role) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((option.role.as_str(), 1)),
        }
    }

    let mut winner: Option<(&str, u32)> = None;
    for (role, votes) in tally {
        if winner.is_none_or(|(_, best)| votes > best) {
            winner = Some((role, votes));
        }
    }

    winner
        .map(|(role, _)| role.to_owned())
        .ok_or(QuizError::NoQuestions)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuizOption, QuizQuestion};

    fn question(id: &str, roles: &[(&str, &str)]) -> QuizQuestion {
        QuizQuestion {
            id: id.into(),
            prompt: String::new(),
            options: roles
                .iter()
                .map(|(opt, role)| QuizOption {
                    id: (*opt).into(),
                    label: String::new(),
                    role: (*role).into(),
                })
                .collect(),
        }
    }

    fn quiz() -> RoleQuizContent {
        RoleQuizContent {
            questions: vec![
                question("q1", &[("a", "builder"), ("b", "seller")]),
                question("q2", &[("a", "builder"), ("b", "seller")]),
                question("q3", &[("a", "builder"), ("b", "seller")]),
            ],
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> QuizAnswers {
        pairs
            .iter()
            .map(|(q, o)| ((*q).to_owned(), (*o).to_owned()))
            .collect()
    }

    #[test]
    fn majority_role_wins() {
        let role = derive_role(&quiz(), &answers(&[("q1", "b"), ("q2", "a"), ("q3", "b")])).unwrap();
        assert_eq!(role, "seller");
    }

    #[test]
    fn tie_goes_to_first_seen_role() {
        let quiz = RoleQuizContent {
            questions: vec![
                question("q1", &[("a", "builder"), ("b", "seller")]),
                question("q2", &[("a", "builder"), ("b", "seller")]),
            ],
        };
        let role = derive_role(&quiz, &answers(&[("q1", "b"), ("q2", "a")])).unwrap();
        assert_eq!(role, "seller");
    }

    #[test]
    fn missing_answer_is_rejected() {
        let err = derive_role(&quiz(), &answers(&[("q1", "a"), ("q2", "a")])).unwrap_err();
        assert_eq!(
            err,
            QuizError::Unanswered {
                question_id: "q3".into()
            }
        );
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err =
            derive_role(&quiz(), &answers(&[("q1", "a"), ("q2", "z"), ("q3", "a")])).unwrap_err();
        assert!(matches!(err, QuizError::UnknownOption { option_id, .. } if option_id == "z"));
    }

    #[test]
    fn unknown_question_is_rejected() {
        let err = derive_role(
            &quiz(),
            &answers(&[("q1", "a"), ("q2", "a"), ("q3", "a"), ("q9", "a")]),
        )
        .unwrap_err();
        assert!(matches!(err, QuizError::UnknownQuestion { .. }));
    }
}
