use std::{
    fs,
    path::{Path, PathBuf},
};

use anomaly_metric::{
    aupro_score, iaps_score, pro_curve, AuproConfig, BatchCollector, IapsConfig, ProFigure,
    RegionBatch,
};
use anomaly_util::{
    empty_mask, is_supported_image, load_mask, load_score_map, ConnectedComponents, Connectivity,
    SUPPORTED_EXTENSIONS,
};
use anyhow::{Context, Result};
use burn::tensor::{backend::Backend, Tensor};
use serde::Serialize;
use walkdir::WalkDir;

/// Evaluation configuration.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Directory of anomaly score maps.
    pub maps_dir: PathBuf,
    /// Directory of ground-truth masks mirroring `maps_dir`.
    pub masks_dir: PathBuf,
    pub aupro: AuproConfig,
    pub iaps: IapsConfig,
    /// Where to write the PRO curve figure data, if anywhere.
    pub figure_path: Option<PathBuf>,
}

impl EvaluationConfig {
    /// Creates a configuration with default metric settings.
    pub fn new(maps_dir: impl Into<PathBuf>, masks_dir: impl Into<PathBuf>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            masks_dir: masks_dir.into(),
            aupro: AuproConfig::new(),
            iaps: IapsConfig::new(),
            figure_path: None,
        }
    }

    /// Uses `connectivity` for both metrics.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.aupro.connectivity = connectivity.clone();
        self.iaps.connectivity = connectivity;
        self
    }

    pub fn connectivity(&self) -> Connectivity {
        self.aupro.connectivity.clone()
    }
}

/// A score map and its ground-truth mask, if one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    pub map: PathBuf,
    pub mask: Option<PathBuf>,
}

/// Settings the report was produced with.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSettings {
    pub fpr_limit: f64,
    pub ioi_thresh: f64,
    pub recall_thresh: f64,
    pub connectivity: Connectivity,
}

/// Result of one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub anomalous_samples: usize,
    pub regions: usize,
    pub aupro: f32,
    pub iap: f64,
    pub iap_at_recall: f64,
    pub settings: ReportSettings,
}

/// Pairs every score map under `maps_dir` with a mask under `masks_dir`.
///
/// A mask matches when it sits at the same relative directory and its stem
/// is either the map's stem or `<stem>_mask`, with any supported extension.
/// Maps are returned in file-name order.
pub fn pair_samples(maps_dir: &Path, masks_dir: &Path) -> Result<Vec<SamplePair>> {
    let mut pairs = Vec::new();
    for entry in WalkDir::new(maps_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", maps_dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported_image(path) {
            continue;
        }

        let relative = path.strip_prefix(maps_dir)?;
        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let mask_dir = relative
            .parent()
            .map_or_else(|| masks_dir.to_path_buf(), |p| masks_dir.join(p));

        let names = [stem.to_string(), format!("{stem}_mask")];
        let mask = names
            .iter()
            .flat_map(|name| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .map(move |ext| format!("{name}.{ext}"))
            })
            .map(|file| mask_dir.join(file))
            .find(|candidate| candidate.is_file());

        pairs.push(SamplePair {
            map: path.to_path_buf(),
            mask,
        });
    }
    Ok(pairs)
}

/// Loads one pair; a missing mask becomes an all-background mask.
fn load_pair<B: Backend>(
    pair: &SamplePair,
    device: &B::Device,
) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
    let map = load_score_map::<B, _>(&pair.map, device)?;
    let [_, _, height, width] = map.dims();

    let mask = match &pair.mask {
        Some(path) => {
            let mask = load_mask::<B, _>(path, device)?;
            if mask.dims() != map.dims() {
                anyhow::bail!(
                    "mask {} is {:?} but score map {} is {:?}",
                    path.display(),
                    mask.dims(),
                    pair.map.display(),
                    map.dims()
                );
            }
            mask
        }
        None => empty_mask(height, width, device),
    };
    Ok((map, mask))
}

/// Computes AUPRO and IAPS for all score maps of `config.maps_dir`.
///
/// # Errors
///
/// Returns an error if no score map is found, an image cannot be read, maps
/// and masks differ in size, or the metrics reject the data.
pub fn run_evaluation<B, L>(
    config: &EvaluationConfig,
    labeler: &L,
    device: &B::Device,
) -> Result<EvaluationReport>
where
    B: Backend,
    L: ConnectedComponents<B>,
{
    config.aupro.validate()?;
    config.iaps.validate()?;

    tracing::info!(
        maps = %config.maps_dir.display(),
        masks = %config.masks_dir.display(),
        "pairing score maps with masks",
    );
    let pairs = pair_samples(&config.maps_dir, &config.masks_dir)?;
    if pairs.is_empty() {
        anyhow::bail!("No score maps found in {}", config.maps_dir.display());
    }
    let anomalous_samples = pairs.iter().filter(|p| p.mask.is_some()).count();
    tracing::info!(samples = pairs.len(), anomalous_samples, "loading samples");

    let mut collector = BatchCollector::<B>::new();
    for pair in &pairs {
        let (map, mask) = load_pair::<B>(pair, device)?;
        collector.push(map, mask);
    }

    let (preds, target) = collector
        .concat()
        .context("all score maps must share one resolution")?;
    let batch = RegionBatch::from_tensors(preds, target, labeler)?;
    tracing::info!(regions = batch.num_regions(), "computing metrics");

    let fpr_limit = config.aupro.fpr_limit as f32;
    let curve = pro_curve(&batch, fpr_limit)?;
    let aupro = aupro_score(&curve)?;
    let iaps = iaps_score(&batch, config.iaps.ioi_thresh, config.iaps.recall_thresh)?;

    if let Some(path) = &config.figure_path {
        let figure = ProFigure::new(curve, aupro, fpr_limit);
        fs::write(path, serde_json::to_string_pretty(&figure)?)
            .with_context(|| format!("failed to write figure to {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved PRO figure data");
    }

    Ok(EvaluationReport {
        samples: pairs.len(),
        anomalous_samples,
        regions: batch.num_regions(),
        aupro,
        iap: iaps.average_precision,
        iap_at_recall: iaps.precision_at_recall,
        settings: ReportSettings {
            fpr_limit: config.aupro.fpr_limit,
            ioi_thresh: config.iaps.ioi_thresh,
            recall_thresh: config.iaps.recall_thresh,
            connectivity: config.connectivity(),
        },
    })
}
