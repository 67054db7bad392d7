// src/label.rs

//! Composite transition labels: `action_list_relation` plus a score.
//!
//! The text form splits on the first and the last delimiter, so the list
//! field may be empty or contain the delimiter itself.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::LearnError;

pub const DELIM: char = '_';

/// A label string with the score the model gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct StringPrediction {
    pub label: String,
    pub score: f32,
}

impl StringPrediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransitionLabel {
    action: String,
    list: String,
    relation: String,
    score: f32,
}

impl TransitionLabel {
    pub fn new(action: impl Into<String>, list: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            list: list.into(),
            relation: relation.into(),
            score: 0.0,
        }
    }

    /// Parses `text` with score 0.
    pub fn parse(text: &str) -> Result<Self, LearnError> {
        Self::parse_scored(text, 0.0)
    }

    pub fn parse_scored(text: &str, score: f32) -> Result<Self, LearnError> {
        let (first, last) = match (text.find(DELIM), text.rfind(DELIM)) {
            (Some(first), Some(last)) if first < last => (first, last),
            _ => {
                return Err(LearnError::Format(format!(
                    "transition label '{}' needs two '{}' delimiters",
                    text, DELIM
                )))
            }
        };

        let width = DELIM.len_utf8();
        Ok(Self {
            action: text[..first].to_string(),
            list: text[first + width..last].to_string(),
            relation: text[last + width..].to_string(),
            score,
        })
    }

    pub fn from_prediction(p: &StringPrediction) -> Result<Self, LearnError> {
        Self::parse_scored(&p.label, p.score)
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn list(&self) -> &str {
        &self.list
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn set_score(&mut self, score: f32) {
        self.score = score;
    }

    pub fn is_action(&self, action: &str) -> bool {
        self.action == action
    }

    pub fn is_list(&self, list: &str) -> bool {
        self.list == list
    }

    pub fn is_relation(&self, relation: &str) -> bool {
        self.relation == relation
    }

    pub fn same_action(&self, other: &TransitionLabel) -> bool {
        self.is_action(&other.action)
    }

    pub fn same_list(&self, other: &TransitionLabel) -> bool {
        self.is_list(&other.list)
    }

    pub fn same_relation(&self, other: &TransitionLabel) -> bool {
        self.is_relation(&other.relation)
    }

    /// All three fields match; the score is ignored.
    pub fn equals_all(&self, other: &TransitionLabel) -> bool {
        self.same_action(other) && self.same_list(other) && self.same_relation(other)
    }

    /// Orders by score alone.
    pub fn cmp_score(&self, other: &TransitionLabel) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

impl PartialEq for TransitionLabel {
    fn eq(&self, other: &Self) -> bool {
        self.equals_all(other)
    }
}

impl Eq for TransitionLabel {}

impl fmt::Display for TransitionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIM}{}{DELIM}{}", self.action, self.list, self.relation)
    }
}

impl FromStr for TransitionLabel {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_fields() {
        let label = TransitionLabel::parse("L_S_nsubj").unwrap();
        assert_eq!(label.action(), "L");
        assert_eq!(label.list(), "S");
        assert_eq!(label.relation(), "nsubj");
        assert_eq!(label.score(), 0.0);
    }

    #[test]
    fn test_middle_field_may_hold_delimiters() {
        let label = TransitionLabel::parse("R_a_b_c_dobj").unwrap();
        assert_eq!(label.action(), "R");
        assert_eq!(label.list(), "a_b_c");
        assert_eq!(label.relation(), "dobj");

        let empty = TransitionLabel::parse("N__").unwrap();
        assert_eq!(empty.list(), "");
        assert_eq!(empty.relation(), "");
    }

    #[test]
    fn test_too_few_delimiters() {
        assert!(matches!(TransitionLabel::parse("L_nsubj"), Err(LearnError::Format(_))));
        assert!(TransitionLabel::parse("shift").is_err());
        assert!("".parse::<TransitionLabel>().is_err());
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            ("L", "S", "nsubj"),
            ("R", "", "root"),
            ("N", "P", ""),
            ("", "a_b", "x"),
            ("shift", "__", "dep"),
        ];
        for (a, l, r) in cases {
            let label = TransitionLabel::new(a, l, r);
            let parsed: TransitionLabel = label.to_string().parse().unwrap();
            assert_eq!(parsed, label);
            assert!(parsed.same_action(&label));
            assert!(parsed.same_list(&label));
            assert!(parsed.same_relation(&label));
        }
    }

    #[test]
    fn test_ordering_by_score_only() {
        let p = StringPrediction::new("L_S_nsubj", 0.9);
        let high = TransitionLabel::from_prediction(&p).unwrap();
        let mut low = TransitionLabel::new("L", "S", "nsubj");
        low.set_score(0.1);

        assert_eq!(low.cmp_score(&high), Ordering::Less);
        assert!(low.equals_all(&high));

        let mut labels = vec![high.clone(), TransitionLabel::new("R", "", "dep"), low];
        labels.sort_by(TransitionLabel::cmp_score);
        assert_eq!(labels[0].score(), 0.0);
        assert_eq!(labels[2].score(), 0.9);
    }

    #[test]
    fn test_field_predicates() {
        let label = TransitionLabel::new("L", "S", "nsubj");
        assert!(label.is_action("L"));
        assert!(!label.is_action("R"));
        assert!(label.is_list("S"));
        assert!(label.is_relation("nsubj"));
        assert!(!label.equals_all(&TransitionLabel::new("L", "S", "dobj")));
    }
}
