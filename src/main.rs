// src/main.rs

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nlp_online::component::reader::TsvReader;
use nlp_online::component::tagger::Tagger;
use nlp_online::component::OnlineComponent;
use nlp_online::config::Config;
use nlp_online::model::Model;
use nlp_online::reduce::{ModelReducer, ReduceOptions};

#[derive(Parser, Debug)]
#[command(name = "nlp-online")]
#[command(about = "Train and reduce online NLP components")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a left-to-right tagger.
    Train {
        /// JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Training file or directory
        #[arg(short, long)]
        train: PathBuf,

        /// Extension of training files, `*` for any
        #[arg(long, default_value = "*")]
        train_ext: String,

        /// Development file or directory, evaluated after every epoch
        #[arg(short, long)]
        dev: Option<PathBuf>,

        /// Output model path
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Prune sparse weights of a trained model against a development set.
    Reduce {
        /// JSON configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Trained model path
        #[arg(short, long)]
        model: PathBuf,

        /// Development file or directory
        #[arg(short, long)]
        dev: PathBuf,

        /// Extension of development files, `*` for any
        #[arg(long, default_value = "*")]
        dev_ext: String,

        /// Stop once the score drops to or below this value
        #[arg(long)]
        lower: f64,

        /// Extension appended to the model path in save mode
        #[arg(long, default_value = "red")]
        output_ext: String,

        /// First pruning rate
        #[arg(long, default_value_t = 0.05)]
        start: f64,

        /// Rate step between evaluations
        #[arg(long, default_value_t = 0.01)]
        increment: f64,

        /// Highest rate to try
        #[arg(long, default_value_t = 1.0)]
        max_rate: f64,

        /// Prune once at the start rate and save the result
        #[arg(long, default_value_t = false)]
        save: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    match Cli::parse().command {
        Command::Train {
            config,
            train,
            train_ext,
            dev,
            model,
        } => {
            let config = Config::load(&config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
            let reader = TsvReader::from_config(&config.reader)?;

            let sentences: Vec<_> = reader
                .read_documents(&train, &train_ext)
                .with_context(|| format!("Failed to read training data {}", train.display()))?
                .into_iter()
                .flatten()
                .collect();
            let dev_sentences = match &dev {
                Some(path) => Some(
                    reader
                        .read_documents(path, "*")
                        .with_context(|| format!("Failed to read dev data {}", path.display()))?
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>(),
                ),
                None => None,
            };

            let tagger = Tagger::train(&config, &sentences, dev_sentences.as_deref())
                .context("Training failed")?;
            tagger
                .model()
                .save(&model)
                .with_context(|| format!("Failed to save model {}", model.display()))?;
        }

        Command::Reduce {
            config,
            model,
            dev,
            dev_ext,
            lower,
            output_ext,
            start,
            increment,
            max_rate,
            save,
        } => {
            let config = Config::load(&config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
            let reader = TsvReader::from_config(&config.reader)?;
            let documents = reader
                .read_documents(&dev, &dev_ext)
                .with_context(|| format!("Failed to read dev data {}", dev.display()))?;

            let loaded = Model::load(&model)
                .with_context(|| format!("Failed to load model {}", model.display()))?;
            let mut tagger = Tagger::new(loaded, config.reader.document_based);

            let reducer = ModelReducer::new(ReduceOptions {
                start,
                increment,
                lower_bound: lower,
                max_rate,
                save,
            })?;

            reducer.run(&mut tagger, &documents, &model, &output_ext, |report| {
                println!("{}", report)
            })?;
        }
    }

    Ok(())
}
