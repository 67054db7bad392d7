// src/component/mod.rs

//! Components that drive the model over text, and the pieces they share.
//!
//! The reducer only needs the [`OnlineComponent`] contract: decode a sentence
//! in place, accumulate an [`Eval`], and expose the [`Model`] for pruning.
//! [`tagger::Tagger`] is the left-to-right tagger built on top of it.

pub mod reader;
pub mod tagger;

use std::fmt;

use crate::error::Result;
use crate::model::Model;

/// One token of a sentence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub form: String,
    /// Annotated tag from the corpus, if the column is present.
    pub gold: Option<String>,
    /// Tag assigned by the last decode.
    pub tag: Option<String>,
}

impl Node {
    pub fn new(form: impl Into<String>, gold: Option<String>) -> Self {
        Self {
            form: form.into(),
            gold,
            tag: None,
        }
    }
}

/// Accumulated evaluation over a development set.
pub trait Eval: fmt::Display {
    fn clear(&mut self);

    /// Scalar compared against the reducer's lower bound.
    fn score(&self) -> f64;
}

/// Token-level tagging accuracy, reported as a percentage.
#[derive(Debug, Clone, Default)]
pub struct AccuracyEval {
    correct: usize,
    total: usize,
}

impl AccuracyEval {
    pub fn count(&mut self, gold: &str, predicted: &str) {
        self.total += 1;
        if gold == predicted {
            self.correct += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl Eval for AccuracyEval {
    fn clear(&mut self) {
        self.correct = 0;
        self.total = 0;
    }

    fn score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for AccuracyEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACC = {:5.2} ({}/{})", self.score(), self.correct, self.total)
    }
}

/// A trained decoder whose model can be pruned and re-evaluated.
pub trait OnlineComponent {
    fn model(&self) -> &Model;

    fn model_mut(&mut self) -> &mut Model;

    /// True if a whole file is decoded as one unit.
    fn is_document_based(&self) -> bool;

    /// Decodes one sentence in place, counting it towards [`Self::eval`].
    fn process(&mut self, nodes: &mut [Node]) -> Result<()>;

    fn process_document(&mut self, document: &mut [Vec<Node>]) -> Result<()> {
        for sentence in document.iter_mut() {
            self.process(sentence)?;
        }
        Ok(())
    }

    fn eval(&self) -> &dyn Eval;

    fn eval_mut(&mut self) -> &mut dyn Eval;
}
