//! Evaluation harness for anomaly segmentation score maps.
//!
//! Pairs score maps with ground-truth masks on disk and reports AUPRO and
//! instance average precision over the whole set.

pub mod backend;
pub mod evaluate;

pub use evaluate::{
    pair_samples, run_evaluation, EvaluationConfig, EvaluationReport, ReportSettings, SamplePair,
};
