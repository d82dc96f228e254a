use crate::model_service::ModelError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Chest X-ray classes, in the order of the classifier's output units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Diagnosis {
    #[serde(rename = "Lung_Opacity")]
    LungOpacity,
    Normal,
    Pneumonia,
}

impl Diagnosis {
    pub const ALL: [Diagnosis; 3] = [Diagnosis::LungOpacity, Diagnosis::Normal, Diagnosis::Pneumonia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::LungOpacity => "Lung_Opacity",
            Diagnosis::Normal => "Normal",
            Diagnosis::Pneumonia => "Pneumonia",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(Diagnosis::as_str).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub diagnosis: Diagnosis,
    /// Probability of `diagnosis`, as a percentage.
    pub confidence: f32,
    pub class_probabilities: BTreeMap<Diagnosis, f32>,
    /// Original dimensions, formatted as `{width}x{height}`.
    pub image_size: String,
}

pub fn classify(outputs: &[f32], width: u32, height: u32) -> Result<Classification, ModelError> {
    if outputs.len() != Diagnosis::ALL.len() {
        return Err(ModelError::InvalidOutput(format!(
            "expected {} class scores, got {}",
            Diagnosis::ALL.len(),
            outputs.len()
        )));
    }
    if outputs.iter().any(|value| !value.is_finite()) {
        return Err(ModelError::InvalidOutput(format!(
            "non-finite class scores: {:?}",
            outputs
        )));
    }

    let probabilities = to_probabilities(outputs);

    let (class_index, probability) = probabilities
        .iter()
        .enumerate()
        .map(|(index, value)| (index, *value))
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or_else(|| ModelError::InvalidOutput("no class scores".to_string()))?;

    let diagnosis = Diagnosis::from_index(class_index).ok_or_else(|| {
        ModelError::InvalidOutput(format!("class index {} out of range", class_index))
    })?;

    let class_probabilities = Diagnosis::ALL
        .iter()
        .copied()
        .zip(probabilities.iter().copied())
        .collect();

    Ok(Classification {
        diagnosis,
        confidence: probability * 100.,
        class_probabilities,
        image_size: format!("{}x{}", width, height),
    })
}

/// Passes softmax output through untouched; anything else (raw logits) is
/// normalized with a softmax so the reported probabilities sum to one.
fn to_probabilities(outputs: &[f32]) -> Vec<f32> {
    let sum: f32 = outputs.iter().sum();
    let is_distribution = outputs.iter().all(|value| *value >= 0.) && (sum - 1.).abs() <= 1e-3;
    if is_distribution {
        return outputs.to_vec();
    }

    let max = outputs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = outputs.iter().map(|value| (value - max).exp()).collect();
    let total: f32 = exps.iter().sum();

    exps.iter().map(|value| value / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sums_to_one(classification: &Classification) {
        let sum: f32 = classification.class_probabilities.values().sum();
        assert!((sum - 1.).abs() < 1e-4, "probabilities sum to {}", sum);
    }

    #[test]
    fn test_softmax_output_is_kept() {
        let classification = classify(&[0.1, 0.7, 0.2], 1024, 768).unwrap();

        assert_eq!(classification.diagnosis, Diagnosis::Normal);
        assert!((classification.confidence - 70.).abs() < 1e-4);
        assert_eq!(classification.class_probabilities[&Diagnosis::LungOpacity], 0.1);
        assert_eq!(classification.image_size, "1024x768");
        assert_sums_to_one(&classification);
    }

    #[test]
    fn test_logits_are_normalized() {
        let classification = classify(&[-1.5, 0.25, 3.0], 128, 128).unwrap();

        assert_eq!(classification.diagnosis, Diagnosis::Pneumonia);
        assert_sums_to_one(&classification);

        let max = classification
            .class_probabilities
            .values()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(
            classification.class_probabilities[&classification.diagnosis],
            max
        );
        assert!((classification.confidence - max * 100.).abs() < 1e-3);
    }

    #[test]
    fn test_ties_resolve_to_first_class() {
        let classification = classify(&[0.4, 0.4, 0.2], 10, 20).unwrap();
        assert_eq!(classification.diagnosis, Diagnosis::LungOpacity);
    }

    #[test]
    fn test_wrong_output_length_is_rejected() {
        assert!(matches!(
            classify(&[0.5, 0.5], 1, 1),
            Err(ModelError::InvalidOutput(_))
        ));
        assert!(matches!(
            classify(&[0.1, f32::NAN, 0.2], 1, 1),
            Err(ModelError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_labels_follow_output_order() {
        assert_eq!(Diagnosis::labels(), vec!["Lung_Opacity", "Normal", "Pneumonia"]);
        assert_eq!(Diagnosis::from_index(2), Some(Diagnosis::Pneumonia));
        assert_eq!(Diagnosis::from_index(3), None);
    }
}
