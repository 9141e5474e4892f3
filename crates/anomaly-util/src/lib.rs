//! # Anomaly evaluation utilities
//!
//! Building blocks shared by the region-level anomaly segmentation metrics:
//!
//! - [`components`]: connected-component labeling of ground-truth masks, with a
//!   host union-find backend and an on-device propagation backend
//! - [`curve`]: ROC curve construction and trapezoidal area under a curve
//! - [`image`]: loading score maps and masks from image files

pub mod components;
pub mod curve;
pub mod image;

pub use components::{
    Connectivity, ConnectedComponents, LabelError, LabelMap, LabelerFn, PropagationLabeler,
    UnionFindLabeler, FOREGROUND_THRESHOLD,
};
pub use curve::{area_under_curve, roc_curve, roc_curve_sorted, CurveError, RocCurve};
pub use self::image::{
    empty_mask, is_supported_image, load_mask, load_score_map, ImageError, ImageResult,
    SUPPORTED_EXTENSIONS,
};
