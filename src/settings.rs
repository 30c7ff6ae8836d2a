use crate::{
    error::Error,
    tensor::{ElementType, Quantization, Tensor},
};

pub const DEFAULT_THRESHOLD: f64 = 70.0;

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Element type and shapes of the tensors a model produces.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TensorsInfo {
    pub element_type: ElementType,
    pub dimensions: Vec<Vec<usize>>,
}

impl TensorsInfo {
    pub fn new(element_type: ElementType, dimensions: Vec<Vec<usize>>) -> Self {
        Self {
            element_type,
            dimensions,
        }
    }

    pub fn n_tensors(&self) -> usize {
        self.dimensions.len()
    }

    /// Check that decode-time tensors match what was configured.
    pub fn validate(&self, tensors: &[Tensor<'_>]) -> Result<(), Error> {
        if tensors.len() != self.n_tensors() {
            return Err(Error::GetExpectedNumOutputs(self.n_tensors(), tensors.len()));
        }
        for (index, (tensor, expected)) in tensors.iter().zip(&self.dimensions).enumerate() {
            if tensor.element_type() != self.element_type {
                return Err(Error::TensorTypeMismatch {
                    index,
                    expected: self.element_type,
                    got: tensor.element_type(),
                });
            }
            if tensor.dims() != expected.as_slice() {
                return Err(Error::TensorShapeMismatch {
                    index,
                    expected: expected.clone(),
                    got: tensor.dims().to_vec(),
                });
            }
        }
        Ok(())
    }
}

/// Per-tensor offsets and scales for fixed-point outputs.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct QuantizationTable {
    #[serde(rename = "q-offsets")]
    pub offsets: Vec<f64>,
    #[serde(rename = "q-scales")]
    pub scales: Vec<f64>,
}

impl QuantizationTable {
    pub fn new(offsets: Vec<f64>, scales: Vec<f64>) -> Self {
        Self { offsets, scales }
    }

    pub fn get(&self, index: usize) -> Option<Quantization> {
        Some(Quantization::new(
            *self.offsets.get(index)?,
            *self.scales.get(index)?,
        ))
    }
}

/// Everything a decoder needs before it can decode.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    /// Path to a label file, or the label content itself.
    pub labels: String,
    /// Confidence threshold in percent.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Module specific settings, such as the pose skeleton.
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    pub tensors: TensorsInfo,
    #[serde(default)]
    pub quantization: Option<QuantizationTable>,
}

impl Settings {
    pub fn new(labels: impl Into<String>, tensors: TensorsInfo) -> Self {
        Self {
            labels: labels.into(),
            threshold: DEFAULT_THRESHOLD,
            json: None,
            tensors,
            quantization: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_json(mut self, json: &str) -> Result<Self, Error> {
        self.json = Some(serde_json::from_str(json).map_err(Error::ParseSettings)?);
        Ok(self)
    }

    pub fn with_quantization(mut self, quantization: QuantizationTable) -> Self {
        self.quantization = Some(quantization);
        self
    }

    /// Threshold as a fraction in [0, 1].
    pub fn threshold_fraction(&self) -> Result<f64, Error> {
        percent_to_fraction(self.threshold)
    }

    /// The quantization table to use, if the configured element type needs one.
    pub fn resolve_quantization(&self) -> Result<Option<QuantizationTable>, Error> {
        let element_type = self.tensors.element_type;
        if !element_type.is_quantized() {
            return Ok(None);
        }
        let table = self
            .quantization
            .as_ref()
            .ok_or(Error::MissingQuantization(element_type))?;
        let expected = self.tensors.n_tensors();
        if table.offsets.len() != expected || table.scales.len() != expected {
            return Err(Error::QuantizationLength {
                offsets: table.offsets.len(),
                scales: table.scales.len(),
                expected,
            });
        }
        Ok(Some(table.clone()))
    }
}

pub(crate) fn percent_to_fraction(percent: f64) -> Result<f64, Error> {
    if (0.0..=100.0).contains(&percent) {
        Ok(percent / 100.0)
    } else {
        Err(Error::ThresholdRange(percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint8_info(n: usize) -> TensorsInfo {
        TensorsInfo::new(ElementType::UInt8, vec![vec![1, 4]; n])
    }

    mod resolve_quantization_tests {
        use super::*;

        #[test]
        fn float_needs_no_table() {
            let settings = Settings::new("a", TensorsInfo::new(ElementType::Float32, vec![]));
            assert_eq!(settings.resolve_quantization().unwrap(), None);
        }

        #[test]
        fn quantized_requires_table() {
            let settings = Settings::new("a", uint8_info(3));
            assert!(matches!(
                settings.resolve_quantization(),
                Err(Error::MissingQuantization(ElementType::UInt8))
            ));
        }

        #[test]
        fn table_must_cover_every_tensor() {
            let settings = Settings::new("a", uint8_info(3))
                .with_quantization(QuantizationTable::new(vec![0.0; 3], vec![1.0; 2]));
            assert!(matches!(
                settings.resolve_quantization(),
                Err(Error::QuantizationLength {
                    offsets: 3,
                    scales: 2,
                    expected: 3
                })
            ));
        }

        #[test]
        fn valid_table() {
            let table = QuantizationTable::new(vec![128.0], vec![0.5]);
            let settings = Settings::new("a", uint8_info(1)).with_quantization(table.clone());
            let resolved = settings.resolve_quantization().unwrap().unwrap();
            assert_eq!(resolved, table);
            assert_eq!(resolved.get(0), Some(Quantization::new(128.0, 0.5)));
            assert_eq!(resolved.get(1), None);
        }
    }

    mod deserialize_tests {
        use super::*;

        #[test]
        fn from_json() {
            let settings: Settings = serde_json::from_str(
                r#"{
                    "labels": "labels.txt",
                    "tensors": {"element_type": "UINT8", "dimensions": [[1, 4]]},
                    "quantization": {"q-offsets": [3.0], "q-scales": [0.1]}
                }"#,
            )
            .unwrap();
            assert_eq!(settings.threshold, DEFAULT_THRESHOLD);
            assert_eq!(settings.tensors, uint8_info(1));
            assert_eq!(
                settings.quantization.unwrap().get(0),
                Some(Quantization::new(3.0, 0.1))
            );
        }

        #[test]
        fn threshold_range() {
            let settings = Settings::new("a", uint8_info(1)).with_threshold(101.0);
            assert!(matches!(
                settings.threshold_fraction(),
                Err(Error::ThresholdRange(_))
            ));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn shape_mismatch() {
            let data = [0u8; 5];
            let tensor = Tensor::new(ElementType::UInt8, vec![1, 5], &data).unwrap();
            assert!(matches!(
                uint8_info(1).validate(&[tensor]),
                Err(Error::TensorShapeMismatch { index: 0, .. })
            ));
        }

        #[test]
        fn count_mismatch() {
            assert!(matches!(
                uint8_info(2).validate(&[]),
                Err(Error::GetExpectedNumOutputs(2, 0))
            ));
        }
    }
}
