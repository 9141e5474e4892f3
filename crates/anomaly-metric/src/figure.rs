//! Plot description of the averaged per-region overlap curve.

use serde::Serialize;

use crate::aupro::ProCurve;

/// Title under which the figure is logged.
pub const PRO_TITLE: &str = "PRO";

/// Everything a plotting front end needs to draw the PRO curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProFigure {
    pub fpr: Vec<f32>,
    pub tpr: Vec<f32>,
    pub aupro: f32,
    pub xlim: (f32, f32),
    pub ylim: (f32, f32),
    pub xlabel: String,
    pub ylabel: String,
    pub legend_loc: String,
    pub title: String,
}

impl ProFigure {
    pub fn new(curve: ProCurve, aupro: f32, fpr_limit: f32) -> Self {
        Self {
            fpr: curve.fpr,
            tpr: curve.tpr,
            aupro,
            xlim: (0.0, fpr_limit),
            ylim: (0.0, 1.0),
            xlabel: "Global FPR".to_string(),
            ylabel: "Averaged Per-Region TPR".to_string(),
            legend_loc: "lower right".to_string(),
            title: PRO_TITLE.to_string(),
        }
    }

    /// Legend entry for the curve.
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.title, self.aupro)
    }
}
