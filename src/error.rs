use crate::{region::SourceRegion, tensor::ElementType};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected {0} output tensors, got {1}")]
    GetExpectedNumOutputs(usize, usize),

    #[error("unsupported number of output tensors: {0}")]
    UnsupportedTensorCount(usize),

    #[error("dimension index {0} is out of bounds for tensor with {1} dimensions")]
    GetDim(usize, usize),

    #[error("tensor with dimensions {dims:?} of type {element_type:?} needs {expected} bytes, got {got}")]
    TensorSize {
        dims: Vec<usize>,
        element_type: ElementType,
        expected: usize,
        got: usize,
    },

    #[error("tensor {index} has dimensions {got:?}, expected {expected:?}")]
    TensorShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("tensor {index} has type {got:?}, expected {expected:?}")]
    TensorTypeMismatch {
        index: usize,
        expected: ElementType,
        got: ElementType,
    },

    #[error("unsupported tensor layout with dimensions {0:?}")]
    UnsupportedLayout(Vec<usize>),

    #[error("tensors of type {0:?} with dimensions {1:?} are not supported by the {2} module")]
    UnsupportedCaps(ElementType, Vec<Vec<usize>>, &'static str),

    #[error("failed to build ndarray from tensor data")]
    ConstructArray(#[source] ndarray::ShapeError),

    #[error("grid of {grid} cells cannot be mapped onto a source extent of {source_extent} pixels")]
    PaxelSize { source_extent: u32, grid: usize },

    #[error("source region {0:?} has no area")]
    EmptyRegion(SourceRegion),

    #[error("decoder used before a successful configure")]
    NotConfigured,

    #[error("threshold {0} is outside of the range [0, 100]")]
    ThresholdRange(f64),

    #[error("quantization table is required for tensors of type {0:?}")]
    MissingQuantization(ElementType),

    #[error("quantization table has {offsets} offsets and {scales} scales, expected {expected} of each")]
    QuantizationLength {
        offsets: usize,
        scales: usize,
        expected: usize,
    },

    #[error("failed to read label file: {1:?}")]
    ReadLabels(#[source] std::io::Error, std::path::PathBuf),

    #[error("label source is empty")]
    EmptyLabels,

    #[error("label format with GStreamer structures is no longer supported")]
    DeprecatedLabelFormat,

    #[error("failed to parse label color {0:?}")]
    ParseLabelColor(String),

    #[error("failed to parse module settings")]
    ParseSettings(#[source] serde_json::Error),

    #[error("module settings are required by the {0} module")]
    MissingSettings(&'static str),

    #[error("skeleton has no node with id 0")]
    MissingSkeletonRoot,

    #[error("skeleton links to keypoint {0} which has no node")]
    MissingSkeletonNode(u32),

    #[error("skeleton is not a tree, keypoint {0} is reachable more than once")]
    SkeletonNotATree(u32),

    #[error("keypoint id {id} is out of range for {parts} keypoints")]
    KeypointOutOfRange { id: u32, parts: usize },

    #[error("skeleton has {links} links but the displacement tensor holds {edges} edges")]
    SkeletonEdgeCount { links: usize, edges: usize },

    #[error("offsets tensor has {got} channels, expected {expected}")]
    OffsetChannels { expected: usize, got: usize },

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to usize")]
    ConvertToUSize,
}
