//! Connected-component labeling of ground-truth masks.
//!
//! A mask is a `[planes, height, width]` tensor; every plane is labeled on its
//! own so regions never span two samples. Two interchangeable backends are
//! provided:
//!
//! - [`UnionFindLabeler`] copies the mask to host memory and runs a raster
//!   scan with union-find. This is the right choice for CPU backends.
//! - [`PropagationLabeler`] keeps the work on the tensor's device and
//!   iteratively propagates the minimum pixel id through each neighbourhood
//!   until nothing changes. This suits GPU backends where a host round trip
//!   per pixel would dominate.
//!
//! Both return a [`LabelMap`] renumbered in raster order of first
//! appearance, so the same partition always yields the same label array.

use std::{collections::HashMap, hash::Hash};

use burn::{
    prelude::*,
    tensor::{backend::Backend, ElementConversion, Int, Tensor},
};
use thiserror::Error;

/// Values strictly above this are foreground.
pub const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Errors raised while labeling a mask.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read mask tensor data: {reason}")]
    TensorConversion { reason: String },
}

/// Pixel neighbourhood used to join foreground pixels into regions.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Edge-adjacent neighbours only.
    Four,
    /// Edge- and corner-adjacent neighbours.
    Eight,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::Eight
    }
}

impl Connectivity {
    /// Neighbour offsets `(dy, dx)` already visited by a raster scan.
    const fn backward_offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Self::Four => &[(-1, 0), (0, -1)],
            Self::Eight => &[(-1, -1), (-1, 0), (-1, 1), (0, -1)],
        }
    }

    /// Every neighbour offset `(dy, dx)`.
    const fn offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Self::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Self::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        }
    }
}

/// Integer region map over a flattened `[planes, height, width]` grid.
///
/// `0` is background; every other value identifies one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<u32>,
    regions: Vec<u32>,
}

impl LabelMap {
    /// Wraps an existing label array, keeping the ids as given.
    pub fn from_raw(labels: Vec<u32>) -> Self {
        let mut regions: Vec<u32> = labels.iter().copied().filter(|&l| l != 0).collect();
        regions.sort_unstable();
        regions.dedup();
        Self { labels, regions }
    }

    /// Renumbers raw component keys to `1..=n` in order of first appearance.
    pub fn canonicalize<T, F>(raw: &[T], is_background: F) -> Self
    where
        T: Copy + Eq + Hash,
        F: Fn(T) -> bool,
    {
        let mut ids: HashMap<T, u32> = HashMap::new();
        let labels = raw
            .iter()
            .map(|&key| {
                if is_background(key) {
                    0
                } else {
                    let next = ids.len() as u32 + 1;
                    *ids.entry(key).or_insert(next)
                }
            })
            .collect();
        let regions = (1..=ids.len() as u32).collect();
        Self { labels, regions }
    }

    /// Per-pixel labels in raster order.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Distinct region ids, ascending. Background is not included.
    pub fn regions(&self) -> &[u32] {
        &self.regions
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Maps each region id to its position in [`Self::regions`].
    pub fn region_slots(&self) -> HashMap<u32, usize> {
        self.regions
            .iter()
            .enumerate()
            .map(|(slot, &id)| (id, slot))
            .collect()
    }
}

/// Labels connected foreground regions of a `[planes, height, width]` mask.
pub trait ConnectedComponents<B: Backend> {
    /// Produces the region map of `mask`; pixels above
    /// [`FOREGROUND_THRESHOLD`] are foreground.
    fn label(&self, mask: Tensor<B, 3>) -> Result<LabelMap, LabelError>;
}

/// Adapts a plain function or closure into a labeler.
#[derive(Debug, Clone)]
pub struct LabelerFn<F>(pub F);

impl<B, F> ConnectedComponents<B> for LabelerFn<F>
where
    B: Backend,
    F: Fn(Tensor<B, 3>) -> LabelMap,
{
    fn label(&self, mask: Tensor<B, 3>) -> Result<LabelMap, LabelError> {
        Ok((self.0)(mask))
    }
}

// --- Host union-find backend ---

/// Two-pass union-find labeling on host memory.
#[derive(Debug, Clone, Default)]
pub struct UnionFindLabeler {
    connectivity: Connectivity,
}

impl UnionFindLabeler {
    pub const fn new(connectivity: Connectivity) -> Self {
        Self { connectivity }
    }

    /// Labels an already binarized mask laid out as `[planes, height, width]`.
    pub fn label_binary(&self, foreground: &[bool], shape: [usize; 3]) -> LabelMap {
        let [_, height, width] = shape;
        let plane_size = height * width;
        let mut parent: Vec<usize> = (0..foreground.len()).collect();

        for (index, _) in foreground.iter().enumerate().filter(|&(_, &fg)| fg) {
            let plane_start = index - index % plane_size.max(1);
            let y = (index - plane_start) / width;
            let x = (index - plane_start) % width;

            for &(dy, dx) in self.connectivity.backward_offsets() {
                let (Some(ny), Some(nx)) = (y.checked_add_signed(dy), x.checked_add_signed(dx))
                else {
                    continue;
                };
                if ny >= height || nx >= width {
                    continue;
                }
                let neighbour = plane_start + ny * width + nx;
                if foreground[neighbour] {
                    union(&mut parent, index, neighbour);
                }
            }
        }

        let roots: Vec<usize> = (0..foreground.len())
            .map(|index| {
                if foreground[index] {
                    find(&mut parent, index)
                } else {
                    usize::MAX
                }
            })
            .collect();

        LabelMap::canonicalize(&roots, |root| root == usize::MAX)
    }
}

impl<B: Backend> ConnectedComponents<B> for UnionFindLabeler {
    fn label(&self, mask: Tensor<B, 3>) -> Result<LabelMap, LabelError> {
        let shape = mask.dims();
        let values = mask
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| LabelError::TensorConversion {
                reason: format!("{e:?}"),
            })?;
        let foreground: Vec<bool> = values.iter().map(|&v| v > FOREGROUND_THRESHOLD).collect();

        Ok(self.label_binary(&foreground, shape))
    }
}

/// Finds the root of `i`, halving the path on the way.
fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

// --- On-device propagation backend ---

/// Iterative minimum-label propagation using tensor ops only.
///
/// Each foreground pixel starts with its own 1-based index; every sweep
/// replaces it with the minimum over its neighbourhood. Background holds a
/// sentinel larger than any index so it never leaks into a region. The final
/// map is read back once for renumbering.
#[derive(Debug, Clone, Default)]
pub struct PropagationLabeler {
    connectivity: Connectivity,
}

impl PropagationLabeler {
    pub const fn new(connectivity: Connectivity) -> Self {
        Self { connectivity }
    }
}

impl<B: Backend> ConnectedComponents<B> for PropagationLabeler {
    fn label(&self, mask: Tensor<B, 3>) -> Result<LabelMap, LabelError> {
        let [planes, height, width] = mask.dims();
        let total = planes * height * width;
        if total == 0 {
            return Ok(LabelMap::default());
        }

        let device = mask.device();
        let sentinel = total as i64 + 1;
        let foreground = mask.greater_elem(FOREGROUND_THRESHOLD);
        let background = Tensor::<B, 3, Int>::full([planes, height, width], sentinel, &device);
        let ids = Tensor::<B, 1, Int>::arange(1..sentinel, &device).reshape([planes, height, width]);

        let mut labels = background.clone().mask_where(foreground.clone(), ids);
        let mut sweeps = 0;
        for _ in 0..total {
            sweeps += 1;
            let mut candidate = labels.clone();
            for &(dy, dx) in self.connectivity.offsets() {
                let neighbour = shift_axis(shift_axis(labels.clone(), 1, dy, sentinel), 2, dx, sentinel);
                candidate = candidate.min_pair(neighbour);
            }
            let next = background.clone().mask_where(foreground.clone(), candidate);

            let changed = next
                .clone()
                .not_equal(labels)
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>();
            labels = next;
            if changed == 0 {
                break;
            }
        }
        tracing::trace!(sweeps, planes, height, width, "label propagation converged");

        let raw = labels
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| LabelError::TensorConversion {
                reason: format!("{e:?}"),
            })?;

        Ok(LabelMap::canonicalize(&raw, |id| id == sentinel))
    }
}

/// Returns `out` with `out[.., i, ..] = tensor[.., i + delta, ..]` along `axis`,
/// filling positions that fall outside the tensor with `fill`.
fn shift_axis<B: Backend>(
    tensor: Tensor<B, 3, Int>,
    axis: usize,
    delta: isize,
    fill: i64,
) -> Tensor<B, 3, Int> {
    if delta == 0 {
        return tensor;
    }

    let dims = tensor.dims();
    let device = tensor.device();
    let len = dims[axis];
    if len <= 1 {
        return Tensor::full(dims, fill, &device);
    }

    let mut edge_dims = dims;
    edge_dims[axis] = 1;
    let edge = Tensor::<B, 3, Int>::full(edge_dims, fill, &device);

    if delta < 0 {
        Tensor::cat(vec![edge, tensor.narrow(axis, 0, len - 1)], axis)
    } else {
        Tensor::cat(vec![tensor.narrow(axis, 1, len - 1), edge], axis)
    }
}
