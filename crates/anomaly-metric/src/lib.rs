//! # Region-level anomaly segmentation metrics
//!
//! Evaluation metrics for pixel-level anomaly segmentation whose ground truth
//! holds several disjoint anomalous regions per image. Both metrics weigh
//! every connected region equally instead of every pixel, so small defects
//! count as much as large ones.
//!
//! ## Implemented Metrics
//!
//! - [`Aupro`]: area under the per-region overlap curve, integrated up to a
//!   global false positive rate limit
//! - [`Iaps`]: instance average precision and precision at a target recall
//!
//! ## Usage
//!
//! ```rust,ignore
//! use anomaly_metric::{AuproConfig, IapsConfig};
//! use burn::prelude::*;
//!
//! # fn example<B: burn::tensor::backend::Backend>() -> anomaly_metric::MetricResult<()> {
//! let mut aupro = AuproConfig::new().with_fpr_limit(0.3).init::<B>()?;
//!
//! // 4D tensors: [batch, channel, height, width]; masks hold 0 or 1.
//! let scores = Tensor::<B, 4>::zeros([1, 1, 256, 256], &Default::default());
//! let masks = Tensor::<B, 4>::zeros([1, 1, 256, 256], &Default::default());
//! aupro.update(scores, masks);
//!
//! println!("AUPRO: {}", aupro.compute()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`BatchCollector`] only appends batches; nothing is computed on update
//! - [`RegionBatch`] validates the concatenated batches and labels regions
//!   with an injectable [`anomaly_util::ConnectedComponents`] backend
//! - [`pro_curve`], [`aupro_score`] and [`iaps_score`] are pure functions over
//!   a `RegionBatch`; the metric structs only own configuration, batches and
//!   the labeler

pub mod aupro;
pub mod batch;
pub mod collector;
pub mod error;
pub mod figure;
pub mod iaps;
pub mod interpolate;

pub use aupro::{aupro_score, pro_curve, Aupro, AuproConfig, ProCurve, DEFAULT_FPR_LIMIT};
pub use batch::RegionBatch;
pub use collector::BatchCollector;
pub use error::{MetricError, MetricResult};
pub use figure::{ProFigure, PRO_TITLE};
pub use iaps::{
    iaps_score, instance_scores, precision_recall, Iaps, IapsConfig, IapsScore, PrecisionRecall,
};
pub use interpolate::interp1d;
