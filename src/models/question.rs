// src/models/question.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A question as delivered to the candidate (already shuffled server-side, no answer key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    /// Section code: 'A'..'D'. Questions without a section navigate by plain index.
    #[serde(default)]
    pub section: Option<String>,

    #[serde(default, rename = "type")]
    pub question_type: Option<String>,

    pub question_text: String,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub marks: Option<i32>,
}

/// An exam section and its per-question marks.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub id: &'static str,
    pub name: &'static str,
    pub marks: i32,
}

/// Section order used for navigation.
pub const SECTIONS: [Section; 4] = [
    Section { id: "A", name: "Quantitative Aptitude", marks: 1 },
    Section { id: "B", name: "Logical Reasoning", marks: 1 },
    Section { id: "C", name: "Verbal Ability", marks: 1 },
    Section { id: "D", name: "Technical MCQ's", marks: 2 },
];

pub fn section_by_id(id: &str) -> Option<&'static Section> {
    SECTIONS.iter().find(|s| s.id == id)
}

/// Status of one question in the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Current,
    Answered,
    NotAnswered,
}

/// Ordered question list plus section-aware navigation.
#[derive(Debug, Clone, Default)]
pub struct QuestionPaper {
    questions: Vec<Question>,
}

impl QuestionPaper {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn contains(&self, question_id: i64) -> bool {
        self.questions.iter().any(|q| q.id == question_id)
    }

    fn section_indices(&self, section: Option<&str>) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, q)| q.section.as_deref() == section)
            .map(|(i, _)| i)
            .collect()
    }

    fn section_position(section: Option<&str>) -> Option<usize> {
        section.and_then(|id| SECTIONS.iter().position(|s| s.id == id))
    }

    /// Next question within the section, then the first question of the
    /// next non-empty section, then plain `current + 1`.
    pub fn next_index(&self, current: usize) -> Option<usize> {
        let question = self.questions.get(current)?;
        let section = question.section.as_deref();

        let in_section = self.section_indices(section);
        if let Some(pos) = in_section.iter().position(|&i| i == current) {
            if let Some(&next) = in_section.get(pos + 1) {
                return Some(next);
            }
        }

        if let Some(section_pos) = Self::section_position(section) {
            for later in &SECTIONS[section_pos + 1..] {
                if let Some(&first) = self.section_indices(Some(later.id)).first() {
                    return Some(first);
                }
            }
        }

        (current + 1 < self.questions.len()).then_some(current + 1)
    }

    /// Mirror of [`next_index`](Self::next_index).
    pub fn previous_index(&self, current: usize) -> Option<usize> {
        let question = self.questions.get(current)?;
        let section = question.section.as_deref();

        let in_section = self.section_indices(section);
        if let Some(pos) = in_section.iter().position(|&i| i == current) {
            if pos > 0 {
                return Some(in_section[pos - 1]);
            }
        }

        if let Some(section_pos) = Self::section_position(section) {
            for earlier in SECTIONS[..section_pos].iter().rev() {
                if let Some(&last) = self.section_indices(Some(earlier.id)).last() {
                    return Some(last);
                }
            }
        }

        current.checked_sub(1)
    }

    pub fn status(
        &self,
        index: usize,
        current: usize,
        answers: &HashMap<i64, String>,
    ) -> Option<QuestionStatus> {
        let question = self.questions.get(index)?;
        Some(if index == current {
            QuestionStatus::Current
        } else if answers.contains_key(&question.id) {
            QuestionStatus::Answered
        } else {
            QuestionStatus::NotAnswered
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: i64, section: &str) -> Question {
        Question {
            id,
            section: Some(section.to_string()),
            question_type: Some("mcq".to_string()),
            question_text: format!("Question {id}"),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            marks: None,
        }
    }

    #[test]
    fn next_walks_sections_in_order() {
        // Server order interleaves sections; navigation follows section order.
        let paper = QuestionPaper::new(vec![q(1, "B"), q(2, "A"), q(3, "A"), q(4, "D")]);

        assert_eq!(paper.next_index(1), Some(2)); // A -> A
        assert_eq!(paper.next_index(2), Some(0)); // last A -> first B
        assert_eq!(paper.next_index(0), Some(3)); // B -> D, C is empty
        assert_eq!(paper.next_index(3), None);
    }

    #[test]
    fn previous_walks_sections_backwards() {
        let paper = QuestionPaper::new(vec![q(1, "B"), q(2, "A"), q(3, "A"), q(4, "D")]);

        assert_eq!(paper.previous_index(3), Some(0)); // D -> last B
        assert_eq!(paper.previous_index(0), Some(2)); // B -> last A
        assert_eq!(paper.previous_index(2), Some(1));
        assert_eq!(paper.previous_index(1), Some(0)); // first A, no earlier section -> index - 1
    }

    #[test]
    fn unsectioned_questions_navigate_by_index() {
        let mut a = q(1, "A");
        let mut b = q(2, "A");
        a.section = None;
        b.section = None;
        let paper = QuestionPaper::new(vec![a, b]);

        assert_eq!(paper.next_index(0), Some(1));
        assert_eq!(paper.next_index(1), None);
        assert_eq!(paper.previous_index(1), Some(0));
        assert_eq!(paper.previous_index(0), None);
    }

    #[test]
    fn status_reflects_answers() {
        let paper = QuestionPaper::new(vec![q(1, "A"), q(2, "A"), q(3, "A")]);
        let answers = HashMap::from([(2, "B".to_string())]);

        assert_eq!(paper.status(0, 0, &answers), Some(QuestionStatus::Current));
        assert_eq!(paper.status(1, 0, &answers), Some(QuestionStatus::Answered));
        assert_eq!(paper.status(2, 0, &answers), Some(QuestionStatus::NotAnswered));
        assert_eq!(paper.status(3, 0, &answers), None);
    }

    #[test]
    fn question_deserializes_server_shape() {
        let json = r#"{"id":3,"section":"D","type":"mcq","questionText":"2+2?","options":["3","4"],"marks":2,"qNo":9}"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.id, 3);
        assert_eq!(question.options.len(), 2);
        assert_eq!(section_by_id("D").map(|s| s.marks), Some(2));
    }
}
