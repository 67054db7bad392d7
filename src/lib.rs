// src/lib.rs

//! Online learning engine for transition-based NLP components.
//!
//! A [`network::FeedForwardNetwork`] scores mixed sparse and dense
//! [`feature::FeatureVector`]s against weights held in an explicitly owned
//! [`weights::WeightStore`]. [`train_info::TrainInfo`] schedules roll-in for
//! sequential training, [`label::TransitionLabel`] encodes composite
//! actions, and [`reduce::ModelReducer`] prunes a trained [`model::Model`]
//! under an accuracy floor.

pub mod activation;
pub mod component;
pub mod config;
pub mod error;
pub mod feature;
pub mod label;
pub mod ml_utils;
pub mod model;
pub mod network;
pub mod reduce;
pub mod train_info;
pub mod weights;

pub use error::{LearnError, Result};
