// src/component/tagger.rs

//! Left-to-right sequence tagger.
//!
//! Each token is one decision step. The previous token's tag is part of the
//! feature set, so during training the roll-in schedule decides whether that
//! tag comes from the corpus or from the model's own prediction.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::component::{AccuracyEval, Eval, Node, OnlineComponent};
use crate::config::Config;
use crate::error::{LearnError, Result};
use crate::feature::{FeatureMap, FeatureVector, LabelMap};
use crate::model::Model;
use crate::network::Instance;
use crate::train_info::TrainInfo;

/// Orthographic features in the dense block.
pub const DENSE_DIM: usize = 4;

const BOS: &str = "<s>";
const EOS: &str = "</s>";

pub struct Tagger {
    model: Model,
    eval: AccuracyEval,
    document_based: bool,
}

impl Tagger {
    pub fn new(model: Model, document_based: bool) -> Self {
        Self {
            model,
            eval: AccuracyEval::default(),
            document_based,
        }
    }

    /// Trains a tagger on `train`, logging accuracy on `dev` after each epoch
    /// when given.
    pub fn train(config: &Config, train: &[Vec<Node>], dev: Option<&[Vec<Node>]>) -> Result<Self> {
        let mut tags: Vec<&str> = train
            .iter()
            .flatten()
            .filter_map(|n| n.gold.as_deref())
            .collect();
        tags.sort_unstable();
        tags.dedup();
        if tags.is_empty() {
            return Err(LearnError::Format("training data has no tagged tokens".into()));
        }

        let mut labels = LabelMap::new();
        for tag in tags {
            labels.add(tag);
        }
        info!("Training tagger: {} sentences, {} labels", train.len(), labels.len());

        let model = Model::new(&config.network, DENSE_DIM, labels, FeatureMap::new())?;
        let mut tagger = Self::new(model, config.reader.document_based);
        let mut info = TrainInfo::with_seed(config.train.batch_size, config.train.roll_in, config.train.seed);
        let mut rng = StdRng::seed_from_u64(config.network.seed);

        for epoch in 0..config.train.epochs {
            let mut steps = 0;
            for sentence in train {
                steps += tagger.train_sentence(sentence, &mut info, &mut rng)?;
            }
            let Model { network, weights, .. } = &mut tagger.model;
            network.update_mini_batch(weights);

            debug!(
                "Epoch {}: {} steps, roll-in {:.4}, {} features, {} sparse weights",
                epoch,
                steps,
                info.roll_in_probability(),
                tagger.model.features.len(),
                tagger.model.sparse_weight_count()
            );

            if let Some(dev) = dev {
                let mut dev = dev.to_vec();
                tagger.eval.clear();
                for sentence in &mut dev {
                    tagger.process(sentence)?;
                }
                info!("Epoch {}: {}", epoch, tagger.eval);
            }
        }

        Ok(tagger)
    }

    /// One pass over a sentence. Returns the number of decision steps.
    fn train_sentence(&mut self, sentence: &[Node], info: &mut TrainInfo, rng: &mut StdRng) -> Result<usize> {
        let mut previous = BOS.to_string();
        let mut steps = 0;

        for i in 0..sentence.len() {
            let Some(gold_tag) = sentence[i].gold.as_deref() else {
                previous = BOS.to_string();
                continue;
            };
            let gold = self.model.labels.get(gold_tag);
            let x = self.extract(sentence, i, &previous, true)?;
            let mut instance = Instance::new(x, gold);

            let Model { network, weights, .. } = &mut self.model;
            if info.batch_size() <= 1 {
                network.train(weights, &mut instance, rng)?;
            } else {
                network.accumulate(weights, &mut instance, rng)?;
                if network.pending() >= info.batch_size() {
                    network.update_mini_batch(weights);
                }
            }

            previous = if info.choose_gold() {
                gold_tag.to_string()
            } else {
                self.label_name(instance.predicted())
            };
            info.update_roll_in_probability();
            steps += 1;
        }

        Ok(steps)
    }

    fn label_name(&self, index: usize) -> String {
        self.model.labels.name(index).unwrap_or(BOS).to_string()
    }

    /// Features for token `i`. In training mode unseen feature strings are
    /// added to the map; otherwise they are dropped.
    fn extract(&mut self, nodes: &[Node], i: usize, previous: &str, grow: bool) -> Result<FeatureVector> {
        let form = |j: isize| -> String {
            if j < 0 {
                BOS.to_string()
            } else {
                nodes
                    .get(j as usize)
                    .map_or_else(|| EOS.to_string(), |n| n.form.to_lowercase())
            }
        };

        let i = i as isize;
        let w0 = form(i);
        let suffix: String = {
            let chars: Vec<char> = w0.chars().collect();
            chars[chars.len().saturating_sub(3)..].iter().collect()
        };
        let strings = [
            format!("w0={}", w0),
            format!("w-1={}", form(i - 1)),
            format!("w+1={}", form(i + 1)),
            format!("p-1={}", previous),
            format!("p-1|w0={}|{}", previous, w0),
            format!("sf3={}", suffix),
        ];

        let indices: Vec<usize> = strings
            .iter()
            .filter_map(|s| {
                if grow {
                    Some(self.model.features.add(s))
                } else {
                    self.model.features.get(s)
                }
            })
            .collect();

        let raw = &nodes[i as usize].form;
        let dense = vec![
            indicator(raw.chars().next().is_some_and(char::is_uppercase)),
            indicator(raw.chars().any(|c| c.is_ascii_digit())),
            indicator(raw.contains('-')),
            raw.chars().count().min(10) as f32 / 10.0,
        ];

        FeatureVector::from_indices(indices, dense)
    }
}

fn indicator(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl OnlineComponent for Tagger {
    fn model(&self) -> &Model {
        &self.model
    }

    fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    fn is_document_based(&self) -> bool {
        self.document_based
    }

    fn process(&mut self, nodes: &mut [Node]) -> Result<()> {
        let mut previous = BOS.to_string();
        for i in 0..nodes.len() {
            let x = self.extract(nodes, i, &previous, false)?;
            let mut instance = Instance::new(x, None);
            let predicted = self.model.predict(&mut instance)?;
            let tag = self.label_name(predicted);

            if let Some(gold) = nodes[i].gold.as_deref() {
                self.eval.count(gold, &tag);
            }
            nodes[i].tag = Some(tag.clone());
            previous = tag;
        }
        Ok(())
    }

    fn eval(&self) -> &dyn Eval {
        &self.eval
    }

    fn eval_mut(&mut self) -> &mut dyn Eval {
        &mut self.eval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sentence(tokens: &[(&str, &str)]) -> Vec<Node> {
        tokens
            .iter()
            .map(|(form, tag)| Node::new(*form, Some(tag.to_string())))
            .collect()
    }

    fn corpus() -> Vec<Vec<Node>> {
        vec![
            sentence(&[("The", "DT"), ("dog", "NN"), ("runs", "VBZ")]),
            sentence(&[("A", "DT"), ("cat", "NN"), ("sleeps", "VBZ")]),
            sentence(&[("The", "DT"), ("cat", "NN"), ("runs", "VBZ")]),
            sentence(&[("A", "DT"), ("dog", "NN"), ("sleeps", "VBZ")]),
        ]
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.network.learning_rate = 0.2;
        config.train.epochs = 15;
        config.train.roll_in = 0.9;
        config
    }

    #[test]
    fn test_tagger_fits_training_data() {
        let train = corpus();
        let mut tagger = Tagger::train(&config(), &train, None).unwrap();

        let mut data = corpus();
        for s in &mut data {
            tagger.process(s).unwrap();
        }
        assert!((tagger.eval().score() - 100.0).abs() < 1e-9, "{}", tagger.eval);
        assert_eq!(data[0][1].tag.as_deref(), Some("NN"));
        assert_eq!(tagger.model().label_count(), 3);
        assert!(tagger.model().features.len() > 0);
    }

    #[test]
    fn test_mini_batch_training() {
        let mut config = config();
        config.train.batch_size = 2;
        config.train.epochs = 40;
        let mut tagger = Tagger::train(&config, &corpus(), None).unwrap();

        let mut data = corpus();
        for s in &mut data {
            tagger.process(s).unwrap();
        }
        assert!(tagger.eval().score() > 90.0, "{}", tagger.eval);
    }

    #[test]
    fn test_unknown_words_are_skipped_not_added() {
        let mut tagger = Tagger::train(&config(), &corpus(), None).unwrap();
        let before = tagger.model().features.len();

        let mut unseen = vec![Node::new("Zebras", None), Node::new("gallop", None)];
        tagger.process(&mut unseen).unwrap();
        assert_eq!(tagger.model().features.len(), before);
        assert!(unseen.iter().all(|n| n.tag.is_some()));
        assert_eq!(tagger.eval.total(), 0);
    }

    #[test]
    fn test_untagged_training_data_rejected() {
        let data = vec![vec![Node::new("word", None)]];
        assert!(matches!(
            Tagger::train(&config(), &data, None),
            Err(LearnError::Format(_))
        ));
    }
}
