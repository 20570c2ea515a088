use crate::core::descriptor::KeySchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("No {table} statistic for descriptor key '{key}'")]
    MissingKey { table: &'static str, key: String },
    #[error("Standard deviation for '{key}' must be positive, got {value}")]
    NonPositiveStd { key: String, value: f64 },
    #[error("Vector has {found} values but the schema has {expected}")]
    LengthMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScalerFile {
    mean: BTreeMap<String, f64>,
    std: BTreeMap<String, f64>,
}

/// Z-score standardization of descriptor vectors, `(x - mean) / std`.
///
/// Statistics are keyed by descriptor key and resolved against a schema
/// once, so columns can never be misaligned.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl FeatureScaler {
    /// Loads `[mean]` and `[std]` tables and orders them by `schema`.
    pub fn load(path: &Path, schema: &KeySchema) -> Result<Self, ScalerError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScalerError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: ScalerFile = toml::from_str(&content).map_err(|e| ScalerError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_maps(&file.mean, &file.std, schema)
    }

    pub fn from_maps(
        mean: &BTreeMap<String, f64>,
        std: &BTreeMap<String, f64>,
        schema: &KeySchema,
    ) -> Result<Self, ScalerError> {
        let mut means = Vec::with_capacity(schema.len());
        let mut stds = Vec::with_capacity(schema.len());
        for key in schema.keys() {
            let m = *mean.get(key).ok_or_else(|| ScalerError::MissingKey {
                table: "mean",
                key: key.clone(),
            })?;
            let s = *std.get(key).ok_or_else(|| ScalerError::MissingKey {
                table: "std",
                key: key.clone(),
            })?;
            if !(s.is_finite() && s > 0.0) {
                return Err(ScalerError::NonPositiveStd {
                    key: key.clone(),
                    value: s,
                });
            }
            means.push(m);
            stds.push(s);
        }
        Ok(Self {
            mean: means,
            std: stds,
        })
    }

    pub fn transform(&self, vector: &[f64]) -> Result<Vec<f64>, ScalerError> {
        if vector.len() != self.mean.len() {
            return Err(ScalerError::LengthMismatch {
                expected: self.mean.len(),
                found: vector.len(),
            });
        }
        Ok(vector
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn schema() -> KeySchema {
        KeySchema::new(["CoCo", "CoFe"])
    }

    #[test]
    fn loads_statistics_and_standardizes_in_schema_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scaler.toml");
        fs::write(
            &path,
            r#"
            [mean]
            CoFe = 20.0
            CoCo = 10.0

            [std]
            CoCo = 2.0
            CoFe = 4.0
            "#,
        )
        .unwrap();

        let scaler = FeatureScaler::load(&path, &schema()).unwrap();
        assert_eq!(scaler.transform(&[12.0, 16.0]).unwrap(), vec![1.0, -1.0]);
    }

    #[test]
    fn missing_key_and_bad_std_are_errors() {
        let mean: BTreeMap<String, f64> = [("CoCo".to_string(), 1.0)].into();
        let std: BTreeMap<String, f64> =
            [("CoCo".to_string(), 1.0), ("CoFe".to_string(), 1.0)].into();
        assert!(matches!(
            FeatureScaler::from_maps(&mean, &std, &schema()),
            Err(ScalerError::MissingKey { table: "mean", .. })
        ));

        let mean: BTreeMap<String, f64> =
            [("CoCo".to_string(), 1.0), ("CoFe".to_string(), 1.0)].into();
        let std: BTreeMap<String, f64> =
            [("CoCo".to_string(), 1.0), ("CoFe".to_string(), 0.0)].into();
        assert!(matches!(
            FeatureScaler::from_maps(&mean, &std, &schema()),
            Err(ScalerError::NonPositiveStd { .. })
        ));
    }

    #[test]
    fn wrong_vector_length_is_rejected() {
        let stats: BTreeMap<String, f64> =
            [("CoCo".to_string(), 1.0), ("CoFe".to_string(), 1.0)].into();
        let scaler = FeatureScaler::from_maps(&stats, &stats, &schema()).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(ScalerError::LengthMismatch {
                expected: 2,
                found: 1
            })
        ));
    }
}
