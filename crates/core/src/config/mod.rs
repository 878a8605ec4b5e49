//! Immutable configuration tree
//!
//! Configurations are built once, validated, and then only read. Method
//! references by label are resolved through [`MethodLibrary`] before a replicate
//! starts, so the engine never sees partial or layered parameter sets.

pub mod method;
pub mod program;

pub use method::{
    DeploymentType, DetectionModel, FollowUpConfig, FollowUpThreshold, MeasurementScale,
    MethodConfig, MethodCost, RedundancyFilter, SensorConfig, TravelConfig, WeatherLimits,
};
pub use program::{
    EmissionsConfig, OperatorConfig, ProgramConfig, RepairConfig, VerificationConfig,
    DEFAULT_MAX_LEAK_RATE,
};

use crate::error::{SimError, SimResult};
use std::collections::BTreeMap;

/// Named method definitions shared between programs
#[derive(Debug, Clone, Default)]
pub struct MethodLibrary {
    methods: BTreeMap<String, MethodConfig>,
}

impl MethodLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under its own label, replacing any previous entry
    pub fn insert(&mut self, method: MethodConfig) -> &mut Self {
        self.methods.insert(method.label.clone(), method);
        self
    }

    pub fn get(&self, label: &str) -> Option<&MethodConfig> {
        self.methods.get(label)
    }

    /// Resolve `labels` into owned method configurations, in the given order
    pub fn materialize<S: AsRef<str>>(&self, labels: &[S]) -> SimResult<Vec<MethodConfig>> {
        labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                self.methods.get(label).cloned().ok_or_else(|| {
                    SimError::config("method_labels", format!("unknown method '{label}'"))
                })
            })
            .collect()
    }
}

impl FromIterator<MethodConfig> for MethodLibrary {
    fn from_iter<I: IntoIterator<Item = MethodConfig>>(iter: I) -> Self {
        let mut library = MethodLibrary::new();
        for method in iter {
            library.insert(method);
        }
        library
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_resolves_labels_in_order() {
        let library: MethodLibrary = [MethodConfig::truck("truck"), MethodConfig::ogi_follow_up("OGI_FU")]
            .into_iter()
            .collect();
        let methods = library.materialize(&["OGI_FU", "truck"]).unwrap();
        assert_eq!(methods[0].label, "OGI_FU");
        assert_eq!(methods[1].label, "truck");
    }

    #[test]
    fn test_unknown_label_is_configuration_error() {
        let library = MethodLibrary::new();
        let err = library.materialize(&["drone"]).unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
        assert!(err.to_string().contains("drone"));
    }
}
