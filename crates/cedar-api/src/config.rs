use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to parse configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// One model input, in the position the model was trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    /// Sent when a request does not supply the feature.
    pub default: String,
}

impl FeatureSpec {
    fn new(name: &str, default: &str) -> Self {
        Self { name: name.to_string(), default: default.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub address: String,
    pub endpoint_name: String,
    pub content_type: String,
    pub features: Vec<FeatureSpec>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            endpoint_name: "breast-cancer-prediction-endpoint".to_string(),
            content_type: "text/csv".to_string(),
            features: median_features(),
        }
    }
}

impl ApiConfig {
    pub fn load_from_file(path: &Path) -> ApiResult<Self> {
        if !path.exists() {
            return Err(ApiError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ApiError::ConfigParse(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.endpoint_name.trim().is_empty() {
            return Err(ApiError::InvalidConfig("endpoint_name must not be empty".to_string()));
        }
        if self.features.is_empty() {
            return Err(ApiError::InvalidConfig("at least one feature is required".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.features.iter().find(|f| !seen.insert(f.name.as_str())) {
            return Err(ApiError::InvalidConfig(format!("feature '{}' is listed twice", dup.name)));
        }
        Ok(())
    }
}

/// The Wisconsin diagnostic features in training order, defaulting to column medians.
fn median_features() -> Vec<FeatureSpec> {
    [
        ("mean_radius", "13.3"),
        ("mean_texture", "18.68"),
        ("mean_perimeter", "85.98"),
        ("mean_area", "551.7"),
        ("mean_smoothness", "0.09462"),
        ("mean_compactness", "0.09097"),
        ("mean_concavity", "0.06154"),
        ("mean_concave_points", "0.03341"),
        ("mean_symmetry", "0.1792"),
        ("mean_fractal_dimension", "0.06148"),
        ("radius_error", "0.3237"),
        ("texture_error", "1.095"),
        ("perimeter_error", "2.287"),
        ("area_error", "24.72"),
        ("smoothness_error", "0.00638"),
        ("compactness_error", "0.02042"),
        ("concavity_error", "0.02615"),
        ("concave_points_error", "0.0111"),
        ("symmetry_error", "0.01872"),
        ("fractal_dimension_error", "0.003211"),
        ("worst_radius", "14.97"),
        ("worst_texture", "25.22"),
        ("worst_perimeter", "97.67"),
        ("worst_area", "686.6"),
        ("worst_smoothness", "0.1309"),
        ("worst_compactness", "0.2101"),
        ("worst_concavity", "0.2264"),
        ("worst_concave_points", "0.09861"),
        ("worst_symmetry", "0.2827"),
        ("worst_fractal_dimension", "0.08006"),
    ]
    .into_iter()
    .map(|(name, default)| FeatureSpec::new(name, default))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_has_thirty_ordered_features() {
        let config = ApiConfig::default();
        assert_eq!(config.features.len(), 30);
        assert_eq!(config.features[0], FeatureSpec::new("mean_radius", "13.3"));
        assert_eq!(config.features[29].name, "worst_fractal_dimension");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_custom_features() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("api.toml");
        std::fs::write(
            &path,
            r#"
address = "127.0.0.1:9000"
endpoint_name = "ep"

[[features]]
name = "age"
default = "50"

[[features]]
name = "tumor_size"
default = "2.0"
"#,
        )
        .unwrap();

        let config = ApiConfig::load_from_file(&path).unwrap();
        assert_eq!(config.address, "127.0.0.1:9000");
        assert_eq!(config.content_type, "text/csv");
        assert_eq!(config.features.len(), 2);
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let config = ApiConfig {
            features: vec![FeatureSpec::new("a", "1"), FeatureSpec::new("a", "2")],
            ..ApiConfig::default()
        };
        assert!(matches!(config.validate(), Err(ApiError::InvalidConfig(_))));
    }

    #[test]
    fn test_demo_file_lists_default_features() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/api.toml");
        let config = ApiConfig::load_from_file(&path).unwrap();
        assert_eq!(config, ApiConfig::default());
    }
}
