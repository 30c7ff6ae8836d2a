//! YOLOv5 style box decoding, from either three per-stride grids or one flattened tensor.

use crate::{
    caps::{
        self,
        Dim::{self, Fixed, Range},
        TensorCaps,
    },
    decode::{log_odds, sigmoid, Decoder},
    detection::BoxEntry,
    error::Error,
    labels::LabelTable,
    nms,
    region::{Resolution, SourceRegion},
    settings::{QuantizationTable, Settings, TensorsInfo},
    tensor::{ElementType, Quantization, Tensor},
};
use itertools::iproduct;
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use tracing::{debug, error, info, trace, warn};

pub(crate) const NAME: &str = "yolov5";

/// Index of the objectness score within one anchor's layers.
const SCORE_IDX: usize = 4;
/// Index of the first class logit within one anchor's layers.
const CLASSES_IDX: usize = 5;
const NUM_ANCHORS: usize = 3;

const WEIGHTS: [[f32; 2]; 3] = [[8.0, 8.0], [16.0, 16.0], [32.0, 32.0]];
const GAINS: [[[f32; 2]; NUM_ANCHORS]; 3] = [
    [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
    [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
    [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
];

const TYPES: &[ElementType] = &[ElementType::Int8, ElementType::UInt8, ElementType::Float32];
const TILE_MAJOR: &[Dim] = &[Fixed(1), Range(1, 136), Range(1, 136), Range(18, 3018)];
const ANCHOR_MAJOR: &[Dim] = &[
    Fixed(1),
    Fixed(NUM_ANCHORS),
    Range(1, 136),
    Range(1, 136),
    Range(6, 85),
];

const CAPS: &[TensorCaps] = &[
    TensorCaps {
        types: TYPES,
        tensors: &[TILE_MAJOR, TILE_MAJOR, TILE_MAJOR],
    },
    TensorCaps {
        types: TYPES,
        tensors: &[ANCHOR_MAJOR, ANCHOR_MAJOR, ANCHOR_MAJOR],
    },
    TensorCaps {
        types: TYPES,
        tensors: &[&[Fixed(1), Range(21, 72828), Range(6, 85)]],
    },
];

#[derive(Debug, Clone)]
struct Config {
    labels: LabelTable,
    /// Fraction in [0, 1], compared with values as stored.
    threshold: f32,
    /// Threshold for the grid tensors: a logit for fixed-point types.
    grid_threshold: f32,
    tensors: TensorsInfo,
    quantization: Option<QuantizationTable>,
}

impl Config {
    fn new(settings: &Settings) -> Result<Self, Error> {
        caps::validate(CAPS, &settings.tensors, NAME)?;

        let labels = LabelTable::load(&settings.labels)?;
        let fraction = settings.threshold_fraction()?;
        let grid_threshold = if settings.tensors.element_type.is_quantized() {
            log_odds(fraction)
        } else {
            fraction
        };
        let quantization = settings.resolve_quantization()?;

        info!(message = "configured", module = NAME, threshold = fraction, labels = labels.len());

        Ok(Self {
            labels,
            threshold: fraction.to_f32().ok_or(Error::ConvertToF32)?,
            grid_threshold: grid_threshold.to_f32().ok_or(Error::ConvertToF32)?,
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

    /// Remap a box in source pixels to `region`, run suppression and keep it if it survives.
    fn push_entry(
        &self,
        entries: &mut Vec<BoxEntry>,
        region: &SourceRegion,
        [top, left, bottom, right]: [f32; 4],
        confidence: f32,
        class_id: u32,
    ) {
        let mut entry = BoxEntry {
            top,
            left,
            bottom,
            right,
            confidence: confidence * 100.0,
            class_id,
            name: self.labels.name(class_id).to_owned(),
            color: self.labels.color(class_id),
        };

        entry.transform_to_region(region);
        if entry.exceeds_region() || entry.bottom < 0.0 || entry.right < 0.0 {
            return;
        }
        entry.top = entry.top.max(0.0);
        entry.left = entry.left.max(0.0);

        trace!(
            message = "box",
            class_id,
            confidence = entry.confidence,
            top = entry.top,
            left = entry.left,
            bottom = entry.bottom,
            right = entry.right
        );

        nms::insert(entries, entry);
    }
}

/// Index of the largest stored value in `start..end`; the first one wins on ties.
fn argmax(tensor: &Tensor<'_>, start: usize, end: usize) -> usize {
    (start + 1..end).fold(start, |best, index| {
        if tensor.compare(index, best) == Ordering::Greater {
            index
        } else {
            best
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    /// `[1, height, width, anchors * layers]`
    TileMajor,
    /// `[1, anchors, height, width, layers]`
    AnchorMajor,
}

/// Geometry of one per-stride output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grid {
    order: Order,
    anchors: usize,
    height: usize,
    width: usize,
    layers: usize,
}

impl Grid {
    fn from_dims(dims: &[usize]) -> Result<Self, Error> {
        let grid = match *dims {
            [_, anchors, height, width, layers] => Self {
                order: Order::AnchorMajor,
                anchors,
                height,
                width,
                layers,
            },
            [_, height, width, channels] => Self {
                order: Order::TileMajor,
                anchors: NUM_ANCHORS,
                height,
                width,
                layers: channels / NUM_ANCHORS,
            },
            _ => return Err(Error::UnsupportedLayout(dims.to_vec())),
        };
        if grid.anchors > NUM_ANCHORS || grid.layers <= CLASSES_IDX || grid.width == 0 {
            return Err(Error::UnsupportedLayout(dims.to_vec()));
        }
        Ok(grid)
    }

    fn tiles(&self) -> usize {
        self.height * self.width
    }

    /// Index of the first layer of `anchor` in `tile`.
    fn offset(&self, tile: usize, anchor: usize) -> usize {
        match self.order {
            Order::TileMajor => (tile * self.anchors + anchor) * self.layers,
            Order::AnchorMajor => (anchor * self.tiles() + tile) * self.layers,
        }
    }
}

/// Decodes YOLOv5 outputs into class-labelled boxes.
#[derive(Debug, Clone, Default)]
pub struct DetectionDecoder {
    config: Option<Config>,
}

impl DetectionDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_grids(
        config: &Config,
        tensors: &[Tensor<'_>],
        region: &SourceRegion,
        resolution: Resolution,
    ) -> Result<Vec<BoxEntry>, Error> {
        let threshold = config.grid_threshold;
        let mut entries = Vec::new();

        for (index, tensor) in tensors.iter().enumerate() {
            let quantization = config.quantization(index, tensor);
            let grid = Grid::from_dims(tensor.dims())?;

            let stride = resolution.width.to_usize().ok_or(Error::ConvertToUSize)? / grid.width;
            let scale = match WEIGHTS.iter().position(|weight| weight[0] as usize == stride) {
                Some(scale) => scale,
                None => {
                    warn!(message = "no anchors for stride, skipping tensor", index, stride);
                    continue;
                }
            };
            let [stride_x, stride_y] = WEIGHTS[scale];

            for (tile, anchor) in iproduct!(0..grid.tiles(), 0..grid.anchors) {
                let base = grid.offset(tile, anchor);

                let score = tensor.value(base + SCORE_IDX, quantization) as f32;
                if !(score > threshold) {
                    continue;
                }

                let class = argmax(tensor, base + CLASSES_IDX, base + grid.layers);
                let class_confidence = tensor.value(class, quantization) as f32;
                if !(class_confidence > threshold) {
                    continue;
                }

                let confidence = sigmoid(class_confidence) * sigmoid(score);

                let [bx, by, bw, bh] =
                    [0, 1, 2, 3].map(|i| sigmoid(tensor.value(base + i, quantization) as f32));

                let x = (tile % grid.width) as f32;
                let y = (tile / grid.width) as f32;
                let [gain_w, gain_h] = GAINS[scale][anchor];

                let cx = (bx * 2.0 - 0.5 + x) * stride_x;
                let cy = (by * 2.0 - 0.5 + y) * stride_y;
                let w = (bw * 2.0).powi(2) * gain_w;
                let h = (bh * 2.0).powi(2) * gain_h;

                config.push_entry(
                    &mut entries,
                    region,
                    [cy - h / 2.0, cx - w / 2.0, cy + h / 2.0, cx + w / 2.0],
                    confidence,
                    (class - base - CLASSES_IDX) as u32,
                );
            }
        }

        Ok(entries)
    }

    fn decode_flat(
        config: &Config,
        tensor: &Tensor<'_>,
        region: &SourceRegion,
        resolution: Resolution,
    ) -> Result<Vec<BoxEntry>, Error> {
        let (tiles, layers) = match *tensor.dims() {
            [_, tiles, layers] if layers > CLASSES_IDX => (tiles, layers),
            _ => return Err(Error::UnsupportedLayout(tensor.dims().to_vec())),
        };
        let quantization = config.quantization(0, tensor);
        let threshold = config.threshold;
        let in_width = resolution.width as f32;
        let in_height = resolution.height as f32;
        let mut entries = Vec::new();

        for tile in 0..tiles {
            let base = tile * layers;

            let score = tensor.value(base + SCORE_IDX, quantization) as f32;
            if !(score > threshold) {
                continue;
            }

            let class = argmax(tensor, base + CLASSES_IDX, base + layers);
            let confidence = tensor.value(class, quantization) as f32 * score;
            if !(confidence > threshold) {
                continue;
            }

            let [cx, cy, w, h] = [0, 1, 2, 3].map(|i| tensor.value(base + i, quantization) as f32);

            config.push_entry(
                &mut entries,
                region,
                [
                    (cy - h / 2.0) * in_height,
                    (cx - w / 2.0) * in_width,
                    (cy + h / 2.0) * in_height,
                    (cx + w / 2.0) * in_width,
                ],
                confidence,
                (class - base - CLASSES_IDX) as u32,
            );
        }

        Ok(entries)
    }
}

impl Decoder for DetectionDecoder {
    type Prediction = BoxEntry;

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
    ) -> Result<Vec<BoxEntry>, Error> {
        let config = self.config.as_ref().ok_or(Error::NotConfigured)?;

        let result = match tensors {
            [_, _, _] | [_] => config
                .tensors
                .validate(tensors)
                .and_then(|_| {
                    if region.is_empty() {
                        Err(Error::EmptyRegion(*region))
                    } else {
                        Ok(())
                    }
                })
                .and_then(|_| match tensors {
                    [tensor] => Self::decode_flat(config, tensor, region, resolution),
                    _ => Self::decode_grids(config, tensors, region, resolution),
                }),
            _ => Err(Error::UnsupportedTensorCount(tensors.len())),
        };

        let mut entries = result.map_err(|e| {
            error!(message = "failed to decode", module = NAME, error = %e);
            e
        })?;
        entries.sort_by(BoxEntry::compare);

        debug!(message = "decoded", module = NAME, boxes = entries.len());

        Ok(entries)
    }
}
