//! Tensor layouts a decoder accepts.

use crate::{error::Error, settings::TensorsInfo, tensor::ElementType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    /// Inclusive on both ends.
    Range(usize, usize),
}

impl Dim {
    pub fn accepts(self, extent: usize) -> bool {
        match self {
            Self::Fixed(n) => extent == n,
            Self::Range(low, high) => (low..=high).contains(&extent),
        }
    }
}

/// One accepted combination of element types and per-tensor shapes.
#[derive(Debug, Clone, Copy)]
pub struct TensorCaps {
    pub types: &'static [ElementType],
    pub tensors: &'static [&'static [Dim]],
}

impl TensorCaps {
    pub fn accepts(&self, info: &TensorsInfo) -> bool {
        self.types.contains(&info.element_type)
            && self.tensors.len() == info.dimensions.len()
            && self
                .tensors
                .iter()
                .zip(&info.dimensions)
                .all(|(caps, dims)| {
                    caps.len() == dims.len()
                        && caps.iter().zip(dims).all(|(dim, &extent)| dim.accepts(extent))
                })
    }
}

/// Check that at least one entry of `caps` accepts `info`.
pub fn validate(caps: &[TensorCaps], info: &TensorsInfo, module: &'static str) -> Result<(), Error> {
    if caps.iter().any(|caps| caps.accepts(info)) {
        Ok(())
    } else {
        Err(Error::UnsupportedCaps(
            info.element_type,
            info.dimensions.clone(),
            module,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Dim::{Fixed, Range};

    const CAPS: TensorCaps = TensorCaps {
        types: &[ElementType::UInt8, ElementType::Float32],
        tensors: &[&[Fixed(1), Range(2, 4)], &[Fixed(1), Fixed(3)]],
    };

    fn info(element_type: ElementType, dimensions: Vec<Vec<usize>>) -> TensorsInfo {
        TensorsInfo {
            element_type,
            dimensions,
        }
    }

    #[test]
    fn accepts_matching_layout() {
        assert!(CAPS.accepts(&info(ElementType::UInt8, vec![vec![1, 4], vec![1, 3]])));
        assert!(CAPS.accepts(&info(ElementType::Float32, vec![vec![1, 2], vec![1, 3]])));
    }

    #[test]
    fn rejects_type() {
        assert!(!CAPS.accepts(&info(ElementType::Int32, vec![vec![1, 4], vec![1, 3]])));
    }

    #[test]
    fn rejects_extent_rank_and_count() {
        assert!(!CAPS.accepts(&info(ElementType::UInt8, vec![vec![1, 5], vec![1, 3]])));
        assert!(!CAPS.accepts(&info(ElementType::UInt8, vec![vec![1, 4, 1], vec![1, 3]])));
        assert!(!CAPS.accepts(&info(ElementType::UInt8, vec![vec![1, 4]])));
    }

    #[test]
    fn validate_reports_module() {
        let result = validate(&[CAPS], &info(ElementType::Int8, vec![]), "test");
        assert!(matches!(result, Err(Error::UnsupportedCaps(ElementType::Int8, _, "test"))));
    }
}
