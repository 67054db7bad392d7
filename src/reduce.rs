// src/reduce.rs

//! # Model reduction
//!
//! Prunes the smallest-magnitude sparse weights of a trained component and
//! re-runs it over a development set after every step.
//!
//! Rates are fractions of the *unreduced* sparse store: rate `f` keeps the
//! `n0 - floor(f * n0)` largest weights, where `n0` is the live slot count
//! before the first prune. Successive rates therefore nest, and the weight
//! count never grows as the rate rises.
//!
//! Search mode evaluates rate 0, then `start`, `start + increment`, ... and
//! stops at the first score at or below the lower bound, or once the rate
//! passes `max_rate`. Save mode prunes once at `start` and writes the model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::component::{Node, OnlineComponent};
use crate::error::{LearnError, Result};

/// A development set: documents of sentences of tokens.
pub type Documents = Vec<Vec<Vec<Node>>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceOptions {
    pub start: f64,
    pub increment: f64,
    /// Scores at or below this end the search.
    pub lower_bound: f64,
    /// Largest rate the search will try.
    pub max_rate: f64,
    pub save: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            start: 0.05,
            increment: 0.01,
            lower_bound: 0.0,
            max_rate: 1.0,
            save: false,
        }
    }
}

impl ReduceOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.increment.is_finite() && self.increment > 0.0) {
            return Err(LearnError::Config(format!(
                "reduction increment must be positive, got {}",
                self.increment
            )));
        }
        if !(0.0..=1.0).contains(&self.max_rate) {
            return Err(LearnError::Config(format!(
                "max rate {} outside [0, 1]",
                self.max_rate
            )));
        }
        if !(0.0..=self.max_rate).contains(&self.start) {
            return Err(LearnError::Config(format!(
                "start rate {} outside [0, {}]",
                self.start, self.max_rate
            )));
        }
        Ok(())
    }
}

/// One evaluated rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionReport {
    pub rate: f64,
    pub score: f64,
    /// The component's evaluation line.
    pub summary: String,
    pub sparse_features: usize,
    pub labels: usize,
    pub nodes_per_second: f64,
}

impl fmt::Display for ReductionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:5.4}: {} -> {:7}, {:3}, N/S = {:.0}",
            self.rate, self.summary, self.sparse_features, self.labels, self.nodes_per_second
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReductionOutcome {
    pub reports: Vec<ReductionReport>,
    /// Highest rate whose score stayed above the lower bound.
    pub best_rate: Option<f64>,
}

pub struct ModelReducer {
    options: ReduceOptions,
}

impl ModelReducer {
    pub fn new(options: ReduceOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Decodes a copy of `dev` and reports the component's score at `rate`.
    ///
    /// Document-based components count one node per document; others count
    /// one per token.
    pub fn evaluate<C: OnlineComponent + ?Sized>(
        &self,
        component: &mut C,
        dev: &[Vec<Vec<Node>>],
        rate: f64,
    ) -> Result<ReductionReport> {
        let mut documents = dev.to_vec();
        component.eval_mut().clear();

        let mut nodes = 0usize;
        let started = Instant::now();
        for document in &mut documents {
            if component.is_document_based() {
                component.process_document(document)?;
                nodes += 1;
            } else {
                for sentence in document.iter_mut() {
                    component.process(sentence)?;
                    nodes += sentence.len();
                }
            }
        }
        let elapsed = started.elapsed().as_secs_f64();

        let model = component.model();
        Ok(ReductionReport {
            rate,
            score: component.eval().score(),
            summary: component.eval().to_string(),
            sparse_features: model.sparse_feature_count(),
            labels: model.label_count(),
            nodes_per_second: if elapsed > 0.0 { nodes as f64 / elapsed } else { 0.0 },
        })
    }

    /// Runs the rate search, handing each report to `on_report` as soon as it
    /// is computed.
    pub fn search<C, F>(&self, component: &mut C, dev: &[Vec<Vec<Node>>], mut on_report: F) -> Result<ReductionOutcome>
    where
        C: OnlineComponent + ?Sized,
        F: FnMut(&ReductionReport),
    {
        let unreduced = component.model().sparse_weight_count();
        info!(
            "Reducing {} sparse weights, lower bound {}",
            unreduced, self.options.lower_bound
        );

        let mut outcome = ReductionOutcome::default();
        let baseline = self.evaluate(component, dev, 0.0)?;
        on_report(&baseline);
        let passed = baseline.score > self.options.lower_bound;
        outcome.reports.push(baseline);
        if !passed {
            info!("Unreduced model already at or below the lower bound");
            return Ok(outcome);
        }
        outcome.best_rate = Some(0.0);

        for step in 0u32.. {
            let rate = self.options.start + f64::from(step) * self.options.increment;
            if rate > self.options.max_rate {
                debug!("Stopping at rate cap {}", self.options.max_rate);
                break;
            }

            prune(component, unreduced, rate);
            let report = self.evaluate(component, dev, rate)?;
            on_report(&report);
            let passed = report.score > self.options.lower_bound;
            outcome.reports.push(report);
            if !passed {
                break;
            }
            outcome.best_rate = Some(rate);
        }

        info!("Best reduction rate: {:?}", outcome.best_rate);
        Ok(outcome)
    }

    /// Prunes once at the start rate, evaluates, and saves the model to `out`
    /// regardless of the score.
    pub fn reduce_and_save<C: OnlineComponent + ?Sized>(
        &self,
        component: &mut C,
        dev: &[Vec<Vec<Node>>],
        out: &Path,
    ) -> Result<ReductionReport> {
        let unreduced = component.model().sparse_weight_count();
        prune(component, unreduced, self.options.start);
        let report = self.evaluate(component, dev, self.options.start)?;
        component.model().save(out)?;
        Ok(report)
    }

    /// Runs save mode or search mode as configured. Save mode writes the
    /// pruned model to `<model>.<output_ext>`.
    pub fn run<C, F>(
        &self,
        component: &mut C,
        dev: &[Vec<Vec<Node>>],
        model: &Path,
        output_ext: &str,
        mut on_report: F,
    ) -> Result<ReductionOutcome>
    where
        C: OnlineComponent + ?Sized,
        F: FnMut(&ReductionReport),
    {
        if !self.options.save {
            return self.search(component, dev, on_report);
        }

        let out = output_path(model, output_ext);
        let report = self.reduce_and_save(component, dev, &out)?;
        on_report(&report);
        info!("Reduced model written to {}", out.display());
        let best_rate = (report.score > self.options.lower_bound).then_some(report.rate);
        Ok(ReductionOutcome {
            reports: vec![report],
            best_rate,
        })
    }
}

/// Prunes to the weight count that `rate` allows out of `unreduced`.
fn prune<C: OnlineComponent + ?Sized>(component: &mut C, unreduced: usize, rate: f64) {
    let drop = ((rate.clamp(0.0, 1.0) * unreduced as f64).floor() as usize).min(unreduced);
    let released = component
        .model_mut()
        .weights
        .sparse
        .retain_largest(unreduced - drop);
    debug!("Rate {:.4}: released {} sparse weights", rate, released);
}

/// `<model>.<ext>`, the file save mode writes to.
pub fn output_path(model: &Path, ext: &str) -> PathBuf {
    let mut name = model.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;
    use crate::component::Eval;
    use crate::config::NetworkConfig;
    use crate::feature::{FeatureMap, LabelMap};
    use crate::model::Model;
    use crate::weights::WeightVector;
    use test_log::test;

    /// Scores the number of sparse weights still alive.
    #[derive(Default)]
    struct CountEval {
        weights: usize,
    }

    impl Eval for CountEval {
        fn clear(&mut self) {
            self.weights = 0;
        }

        fn score(&self) -> f64 {
            self.weights as f64
        }
    }

    impl fmt::Display for CountEval {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "W = {}", self.weights)
        }
    }

    struct WeightCounter {
        model: Model,
        eval: CountEval,
        document_based: bool,
        processed: usize,
    }

    impl WeightCounter {
        fn new(weights: usize, document_based: bool) -> Self {
            let labels = LabelMap::from_names(vec!["A".into(), "B".into()]).unwrap();
            let mut model = Model::new(&NetworkConfig::default(), 0, labels, FeatureMap::new()).unwrap();
            for i in 0..weights {
                model.weights.sparse.add_at(i % 2, i, (i + 1) as f32);
            }
            Self {
                model,
                eval: CountEval::default(),
                document_based,
                processed: 0,
            }
        }
    }

    impl OnlineComponent for WeightCounter {
        fn model(&self) -> &Model {
            &self.model
        }

        fn model_mut(&mut self) -> &mut Model {
            &mut self.model
        }

        fn is_document_based(&self) -> bool {
            self.document_based
        }

        fn process(&mut self, _nodes: &mut [Node]) -> Result<()> {
            self.processed += 1;
            self.eval.weights = self.model.sparse_weight_count();
            Ok(())
        }

        fn eval(&self) -> &dyn Eval {
            &self.eval
        }

        fn eval_mut(&mut self) -> &mut dyn Eval {
            &mut self.eval
        }
    }

    fn dev() -> Documents {
        let sentence = vec![Node::new("a", None), Node::new("b", None)];
        vec![vec![sentence.clone(), sentence.clone()], vec![sentence]]
    }

    fn options(lower_bound: f64) -> ReduceOptions {
        ReduceOptions {
            start: 0.25,
            increment: 0.25,
            lower_bound,
            ..ReduceOptions::default()
        }
    }

    #[test]
    fn test_search_stops_at_lower_bound() {
        let mut component = WeightCounter::new(100, false);
        let reducer = ModelReducer::new(options(40.0)).unwrap();

        let mut printed = Vec::new();
        let outcome = reducer
            .search(&mut component, &dev(), |r| printed.push(r.to_string()))
            .unwrap();

        let rates: Vec<f64> = outcome.reports.iter().map(|r| r.rate).collect();
        let scores: Vec<f64> = outcome.reports.iter().map(|r| r.score).collect();
        assert_eq!(rates, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(scores, vec![100.0, 75.0, 50.0, 25.0]);
        assert_eq!(outcome.best_rate, Some(0.5));
        assert_eq!(printed.len(), 4);
        assert!(printed[0].starts_with("0.0000: W = 100 -> "));
    }

    #[test]
    fn test_search_terminates_at_max_rate() {
        let mut component = WeightCounter::new(8, false);
        let reducer = ModelReducer::new(options(-1.0)).unwrap();
        let outcome = reducer.search(&mut component, &dev(), |_| {}).unwrap();

        assert_eq!(outcome.reports.len(), 5);
        assert_eq!(outcome.best_rate, Some(1.0));
        assert_eq!(component.model().sparse_weight_count(), 0);
    }

    #[test]
    fn test_failing_baseline_stops_immediately() {
        let mut component = WeightCounter::new(10, false);
        let reducer = ModelReducer::new(options(10.0)).unwrap();
        let outcome = reducer.search(&mut component, &dev(), |_| {}).unwrap();

        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.best_rate, None);
        assert_eq!(component.model().sparse_weight_count(), 10);
    }

    #[test]
    fn test_pruning_keeps_largest_weights() {
        let mut component = WeightCounter::new(20, false);
        prune(&mut component, 20, 0.5);
        let sparse = &component.model().weights.sparse;
        assert_eq!(sparse.active_count(), 10);
        assert!(sparse.entries().iter().all(|&(_, _, v)| v > 10.0));
    }

    #[test]
    fn test_evaluate_counts_nodes_per_unit() {
        let reducer = ModelReducer::new(ReduceOptions::default()).unwrap();

        let mut by_sentence = WeightCounter::new(4, false);
        let report = reducer.evaluate(&mut by_sentence, &dev(), 0.0).unwrap();
        assert_eq!(by_sentence.processed, 3);
        assert_eq!(report.labels, 2);
        assert_eq!(report.sparse_features, 4);

        let mut by_document = WeightCounter::new(4, true);
        reducer.evaluate(&mut by_document, &dev(), 0.0).unwrap();
        assert_eq!(by_document.processed, 3);
    }

    #[test]
    fn test_save_mode_writes_reduced_model() {
        let dir = tempfile::tempdir().unwrap();
        let out = output_path(&dir.path().join("tagger.model"), "red");
        assert_eq!(out.file_name().unwrap(), "tagger.model.red");

        let mut component = WeightCounter::new(40, false);
        let reducer = ModelReducer::new(options(1000.0)).unwrap();
        let report = reducer.reduce_and_save(&mut component, &dev(), &out).unwrap();

        assert_eq!(report.score, 30.0);
        let loaded = Model::load(&out).unwrap();
        assert_eq!(loaded.sparse_weight_count(), 30);
    }

    #[test]
    fn test_run_dispatches_on_save_flag() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tagger.model");
        let out = output_path(&model, "red");

        let mut component = WeightCounter::new(40, false);
        let search = ModelReducer::new(options(15.0)).unwrap();
        let outcome = search.run(&mut component, &dev(), &model, "red", |_| {}).unwrap();
        assert_eq!(outcome.reports.len(), 4);
        assert!(!out.exists());

        let mut component = WeightCounter::new(40, false);
        let save = ModelReducer::new(ReduceOptions {
            save: true,
            ..options(15.0)
        })
        .unwrap();
        let mut lines = 0;
        let outcome = save
            .run(&mut component, &dev(), &model, "red", |_| lines += 1)
            .unwrap();
        assert_eq!(lines, 1);
        assert_eq!(outcome.best_rate, Some(0.25));
        assert_eq!(Model::load(&out).unwrap().sparse_weight_count(), 30);
    }

    #[test]
    fn test_invalid_options() {
        let bad = [
            ReduceOptions { increment: 0.0, ..ReduceOptions::default() },
            ReduceOptions { max_rate: 1.5, ..ReduceOptions::default() },
            ReduceOptions { start: 0.8, max_rate: 0.5, ..ReduceOptions::default() },
        ];
        for options in bad {
            assert!(matches!(ModelReducer::new(options), Err(LearnError::Config(_))));
        }
    }

    #[test]
    fn test_report_format() {
        let report = ReductionReport {
            rate: 0.05,
            score: 97.5,
            summary: "ACC = 97.50 (39/40)".into(),
            sparse_features: 1234,
            labels: 12,
            nodes_per_second: 5000.4,
        };
        assert_eq!(
            report.to_string(),
            "0.0500: ACC = 97.50 (39/40) ->    1234,  12, N/S = 5000"
        );
    }
}
