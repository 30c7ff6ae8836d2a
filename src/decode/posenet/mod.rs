//! Multi-pose decoding of heatmap, short-range offset and displacement tensors.

use crate::{
    caps::{self, Dim::Fixed, Dim::Range, TensorCaps},
    decode::{log_odds, sigmoid, Decoder},
    error::Error,
    labels::LabelTable,
    nms::{self, NmsDecision},
    point::Point,
    pose::{constants::NUM_REFINEMENT_STEPS, KeypointLink, PoseEstimation},
    region::{Resolution, SourceRegion},
    settings::{percent_to_fraction, QuantizationTable, Settings, TensorsInfo},
    tensor::{ElementType, Quantization, Tensor},
};
use ndarray::Array4;
use num_traits::ToPrimitive;
use root_point::extract_root_points;
use skeleton::{PosenetSettings, Skeleton};
use tracing::{debug, error, info, trace};

mod root_point;
mod skeleton;

pub(crate) const NAME: &str = "posenet";

const CAPS: &[TensorCaps] = &[TensorCaps {
    types: &[ElementType::Int8, ElementType::UInt8, ElementType::Float32],
    tensors: &[
        &[Fixed(1), Range(5, 251), Range(5, 251), Range(1, 17)],
        &[Fixed(1), Range(5, 251), Range(5, 251), Range(2, 34)],
        &[Fixed(1), Range(5, 251), Range(5, 251), Range(4, 64)],
    ],
}];

#[derive(Debug, Clone)]
struct Config {
    labels: LabelTable,
    skeleton: Skeleton,
    /// Logit of the confidence threshold.
    threshold: f32,
    tensors: TensorsInfo,
    quantization: Option<QuantizationTable>,
}

impl Config {
    fn new(settings: &Settings) -> Result<Self, Error> {
        caps::validate(CAPS, &settings.tensors, NAME)?;

        let labels = LabelTable::load(&settings.labels)?;

        let json = settings.json.clone().ok_or(Error::MissingSettings(NAME))?;
        let posenet: PosenetSettings = serde_json::from_value(json).map_err(Error::ParseSettings)?;

        let fraction = percent_to_fraction(posenet.confidence.unwrap_or(settings.threshold))?;
        let threshold = log_odds(fraction)
            .to_f32()
            .ok_or(Error::ConvertToF32)?;

        let skeleton = Skeleton::from_nodes(&posenet.posenet)?;
        validate_skeleton(&skeleton, &settings.tensors)?;

        let quantization = settings.resolve_quantization()?;

        info!(message = "configured", module = NAME, threshold = fraction, links = skeleton.links.len());

        Ok(Self {
            labels,
            skeleton,
            threshold,
            tensors: settings.tensors.clone(),
            quantization,
        })
    }

    fn quantization(&self, index: usize, tensor: &Tensor<'_>) -> Quantization {
        self.quantization
            .as_ref()
            .and_then(|table| table.get(index))
            .unwrap_or_else(|| tensor.quantization())
    }
}

/// Check the skeleton against the shapes of the configured tensors.
fn validate_skeleton(skeleton: &Skeleton, tensors: &TensorsInfo) -> Result<(), Error> {
    let channels = |index: usize| tensors.dimensions[index][3];
    let num_parts = channels(0);

    for (index, dims) in tensors.dimensions.iter().enumerate().skip(1) {
        if dims[1..3] != tensors.dimensions[0][1..3] {
            let mut expected = dims.clone();
            expected[1..3].copy_from_slice(&tensors.dimensions[0][1..3]);
            return Err(Error::TensorShapeMismatch {
                index,
                expected,
                got: dims.clone(),
            });
        }
    }

    if channels(1) != 2 * num_parts {
        return Err(Error::OffsetChannels {
            expected: 2 * num_parts,
            got: channels(1),
        });
    }

    let edges = channels(2) / 4;
    if skeleton.links.len() != edges {
        return Err(Error::SkeletonEdgeCount {
            links: skeleton.links.len(),
            edges,
        });
    }

    match skeleton.max_keypoint_id() {
        Some(id) if id as usize >= num_parts => Err(Error::KeypointOutOfRange {
            id,
            parts: num_parts,
        }),
        _ => Ok(()),
    }
}

/// Size in source pixels of one grid cell along an axis.
fn paxel_size(source_extent: u32, grid: usize) -> Result<f32, Error> {
    let extent = source_extent.to_usize().ok_or(Error::ConvertToUSize)?;
    if grid < 2 || extent < grid {
        return Err(Error::PaxelSize {
            source_extent,
            grid,
        });
    }
    ((extent - 1) / (grid - 1)).to_f32().ok_or(Error::ConvertToF32)
}

/// Decodes PoseNet style outputs into poses.
///
/// Expects a heatmap `[1, rows, cols, parts]`, short-range offsets
/// `[1, rows, cols, 2 * parts]` (all Y offsets then all X offsets) and displacements
/// `[1, rows, cols, 4 * edges]` (forward Y, forward X, backward Y, backward X).
#[derive(Debug, Clone, Default)]
pub struct PoseDecoder {
    config: Option<Config>,
}

impl PoseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display links shared by every decoded pose.
    pub fn connections(&self) -> &[KeypointLink] {
        self.config
            .as_ref()
            .map(|config| config.skeleton.connections.as_slice())
            .unwrap_or(&[])
    }
}

/// Per-call state for walking the skeleton of one pose.
struct Traversal<'a> {
    heatmap: &'a Array4<f32>,
    offsets: &'a Array4<f32>,
    displacements: &'a Array4<f32>,
    links: &'a [KeypointLink],
    labels: &'a LabelTable,
    paxel_width: f32,
    paxel_height: f32,
    max_x: f32,
    max_y: f32,
}

impl Traversal<'_> {
    /// Nearest grid cell to a point in source pixels.
    fn snap(&self, point: Point) -> (usize, usize) {
        let (_, rows, cols, _) = self.heatmap.dim();
        let row = (point.y() / self.paxel_height)
            .round()
            .clamp(0.0, (rows - 1) as f32);
        let col = (point.x() / self.paxel_width)
            .round()
            .clamp(0.0, (cols - 1) as f32);
        (row as usize, col as usize)
    }

    /// Locate every keypoint reachable over one skeleton edge from a known keypoint.
    ///
    /// Backwards traversal walks the edges last to first with their ends swapped.
    fn traverse(&self, pose: &mut PoseEstimation, backwards: bool) {
        let num_edges = self.links.len();
        let num_parts = pose.num_parts();

        for edge in 0..num_edges {
            let id = if backwards { num_edges - 1 - edge } else { edge };
            let link = self.links[id];
            let (source, destination) = if backwards {
                (link.destination as usize, link.source as usize)
            } else {
                (link.source as usize, link.destination as usize)
            };

            let keypoints = pose.keypoints();
            if !keypoints[source].is_populated() || keypoints[destination].is_populated() {
                continue;
            }

            let origin = keypoints[source].point();
            let (row, col) = self.snap(origin);
            let channel = if backwards { id + 2 * num_edges } else { id };
            let displaced = origin
                + Point::new(
                    self.displacements[[0, row, col, channel + num_edges]],
                    self.displacements[[0, row, col, channel]],
                );
            let mut y = displaced.y();
            let mut x = displaced.x();

            for _ in 0..NUM_REFINEMENT_STEPS {
                let (row, col) = self.snap(Point::new(x, y));
                y = row as f32 * self.paxel_height + self.offsets[[0, row, col, destination]];
                x = col as f32 * self.paxel_width
                    + self.offsets[[0, row, col, destination + num_parts]];
            }

            let x = x.clamp(0.0, self.max_x);
            let y = y.clamp(0.0, self.max_y);
            let (row, col) = self.snap(Point::new(x, y));
            let confidence = sigmoid(self.heatmap[[0, row, col, destination]]) * 100.0;

            let label = destination as u32;
            let keypoint = &mut pose.keypoints_mut()[destination];
            keypoint.x = x;
            keypoint.y = y;
            keypoint.confidence = confidence;
            keypoint.name = self.labels.name(label).to_owned();
            keypoint.color = self.labels.color(label);

            trace!(message = "keypoint", id = destination, x, y, confidence, backwards);

            pose.confidence += confidence / num_parts as f32;
        }
    }
}

impl Decoder for PoseDecoder {
    type Prediction = PoseEstimation;

    fn name(&self) -> &'static str {
        NAME
    }

    fn caps(&self) -> &'static [TensorCaps] {
        CAPS
    }

    fn configure(&mut self, settings: &Settings) -> Result<(), Error> {
        self.config = None;
        let config = Config::new(settings).map_err(|e| {
            error!(message = "failed to configure", module = NAME, error = %e);
            e
        })?;
        self.config = Some(config);
        Ok(())
    }

    fn decode(
        &self,
        tensors: &[Tensor<'_>],
        region: &SourceRegion,
        resolution: Resolution,
    ) -> Result<Vec<PoseEstimation>, Error> {
        let config = self.config.as_ref().ok_or(Error::NotConfigured)?;
        config.tensors.validate(tensors).map_err(|e| {
            error!(message = "unexpected tensors", module = NAME, error = %e);
            e
        })?;

        if region.is_empty() {
            error!(message = "empty source region", module = NAME, ?region);
            return Err(Error::EmptyRegion(*region));
        }

        let [heatmap, offsets, displacements] = match tensors {
            [a, b, c] => [
                a.to_array4(config.quantization(0, a))?,
                b.to_array4(config.quantization(1, b))?,
                c.to_array4(config.quantization(2, c))?,
            ],
            _ => return Err(Error::GetExpectedNumOutputs(3, tensors.len())),
        };

        let (_, rows, cols, num_parts) = heatmap.dim();
        let paxel_width = paxel_size(resolution.width, cols)?;
        let paxel_height = paxel_size(resolution.height, rows)?;

        let traversal = Traversal {
            heatmap: &heatmap,
            offsets: &offsets,
            displacements: &displacements,
            links: &config.skeleton.links,
            labels: &config.labels,
            paxel_width,
            paxel_height,
            max_x: (resolution.width - 1) as f32,
            max_y: (resolution.height - 1) as f32,
        };

        let root_points =
            extract_root_points(&heatmap, &offsets, config.threshold, paxel_width, paxel_height);
        let mut poses = Vec::new();

        for root in &root_points {
            let mut pose = PoseEstimation::new(num_parts, Vec::new());

            let label = root.id as u32;
            let seed = &mut pose.keypoints_mut()[root.id];
            seed.x = root.x.clamp(0.0, traversal.max_x);
            seed.y = root.y.clamp(0.0, traversal.max_y);
            seed.confidence = root.confidence.into_inner();
            seed.name = config.labels.name(label).to_owned();
            seed.color = config.labels.color(label);
            pose.confidence = root.confidence.into_inner() / num_parts as f32;

            traversal.traverse(&mut pose, true);
            traversal.traverse(&mut pose, false);

            let decision = nms::non_max_suppression(&pose, &poses);
            if decision == NmsDecision::DiscardNew {
                continue;
            }
            pose.links = config.skeleton.connections.clone();
            nms::apply(decision, &mut poses, pose);
        }

        for pose in &mut poses {
            pose.transform_to_region(region);
        }

        debug!(message = "decoded", module = NAME, root_points = root_points.len(), poses = poses.len());

        Ok(poses)
    }
}
