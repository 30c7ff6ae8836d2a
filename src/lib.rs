//! Post-processing for pose estimation and object detection model outputs.

pub mod caps;
pub mod decode;
pub mod detection;
pub mod error;
pub mod labels;
pub mod nms;
pub mod point;
pub mod pose;
pub mod region;
pub mod settings;
pub mod tensor;

pub use decode::{Decoder, DetectionDecoder, Module, ModuleKind, PoseDecoder, Predictions};
pub use detection::BoxEntry;
pub use error::Error;
pub use pose::{Keypoint, KeypointLink, PoseEstimation};
pub use region::{Resolution, SourceRegion};
pub use settings::{QuantizationTable, Settings, TensorsInfo};
pub use tensor::{ElementType, Quantization, Tensor};
