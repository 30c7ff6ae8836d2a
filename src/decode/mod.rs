use crate::{
    caps::TensorCaps,
    detection::BoxEntry,
    error::Error,
    pose::PoseEstimation,
    region::{Resolution, SourceRegion},
    settings::Settings,
    tensor::Tensor,
};
use std::{fmt, str::FromStr};

pub mod posenet;
pub mod yolov5;

pub use posenet::PoseDecoder;
pub use yolov5::DetectionDecoder;

/// A post-processing stage turning raw output tensors into predictions.
pub trait Decoder {
    type Prediction;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Tensor layouts this decoder can decode.
    fn caps(&self) -> &'static [TensorCaps];

    /// Load labels, thresholds and module settings. Must succeed before `decode` is called.
    fn configure(&mut self, settings: &Settings) -> Result<(), Error>;

    /// Decode one set of output tensors.
    fn decode(
        &self,
        tensors: &[Tensor<'_>],
        region: &SourceRegion,
        resolution: Resolution,
    ) -> Result<Vec<Self::Prediction>, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Posenet,
    Yolov5,
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posenet" => Ok(Self::Posenet),
            "yolov5" => Ok(Self::Yolov5),
            other => Err(format!("unknown module: {}", other)),
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posenet => posenet::NAME,
            Self::Yolov5 => yolov5::NAME,
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "predictions", rename_all = "lowercase")]
pub enum Predictions {
    Poses(Vec<PoseEstimation>),
    Boxes(Vec<BoxEntry>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Self::Poses(poses) => poses.len(),
            Self::Boxes(boxes) => boxes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Either decoder, selected at runtime.
#[derive(Debug, Clone)]
pub enum Module {
    Posenet(PoseDecoder),
    Yolov5(DetectionDecoder),
}

impl Module {
    pub fn new(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::Posenet => Self::Posenet(PoseDecoder::default()),
            ModuleKind::Yolov5 => Self::Yolov5(DetectionDecoder::default()),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Posenet(_) => ModuleKind::Posenet,
            Self::Yolov5(_) => ModuleKind::Yolov5,
        }
    }

    pub fn caps(&self) -> &'static [TensorCaps] {
        match self {
            Self::Posenet(d) => d.caps(),
            Self::Yolov5(d) => d.caps(),
        }
    }

    pub fn configure(&mut self, settings: &Settings) -> Result<(), Error> {
        match self {
            Self::Posenet(d) => d.configure(settings),
            Self::Yolov5(d) => d.configure(settings),
        }
    }

    pub fn decode(
        &self,
        tensors: &[Tensor<'_>],
        region: &SourceRegion,
        resolution: Resolution,
    ) -> Result<Predictions, Error> {
        Ok(match self {
            Self::Posenet(d) => Predictions::Poses(d.decode(tensors, region, resolution)?),
            Self::Yolov5(d) => Predictions::Boxes(d.decode(tensors, region, resolution)?),
        })
    }
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of `sigmoid`, used to compare probabilities against raw logits.
#[inline]
pub(crate) fn log_odds(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    mod sigmoid_tests {
        use super::*;

        #[test]
        fn midpoint() {
            assert_approx_eq!(sigmoid(0.0), 0.5);
        }

        #[test]
        fn symmetric() {
            assert_approx_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0);
        }

        #[test]
        fn inverse_of_log_odds() {
            for &p in &[0.1, 0.5, 0.7, 0.95] {
                assert_approx_eq!(f64::from(sigmoid(log_odds(p) as f32)), p, 1e-6);
            }
        }
    }

    mod log_odds_tests {
        use super::*;

        #[test]
        fn bounds() {
            assert_eq!(log_odds(0.0), f64::NEG_INFINITY);
            assert_eq!(log_odds(1.0), f64::INFINITY);
            assert_approx_eq!(log_odds(0.5), 0.0);
        }
    }

    mod module_kind_tests {
        use super::*;

        #[test]
        fn parse_and_display() {
            assert_eq!("PoseNet".parse::<ModuleKind>().unwrap(), ModuleKind::Posenet);
            assert_eq!("yolov5".parse::<ModuleKind>().unwrap(), ModuleKind::Yolov5);
            assert!("ssd".parse::<ModuleKind>().is_err());
            assert_eq!(ModuleKind::Yolov5.to_string(), "yolov5");
            assert_eq!(Module::new(ModuleKind::Posenet).kind(), ModuleKind::Posenet);
        }

        #[test]
        fn decode_before_configure_fails() {
            let module = Module::new(ModuleKind::Yolov5);
            let result = module.decode(&[], &SourceRegion::default(), Resolution::default());
            assert!(matches!(result, Err(Error::NotConfigured)));
        }
    }
}
