use serde::{Deserialize, Serialize};

use crate::feature::Feature;

/// Discriminator for the only projection shape written today.
pub const PROJECTION_TYPE: &str = "MongoBDProjection";

/// The durable form of a flag override.
///
/// Rows are keyed on (`projection_type`, `feature_name`). They carry no type
/// information: behavior always comes from the registry when a row is read back.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub feature_name: String,
    pub description: String,
    pub value: bool,
    pub projection_type: String,
}

impl Projection {
    pub fn from_feature(feature: &Feature) -> Self {
        Self {
            feature_name: feature.name.clone(),
            description: feature.description.clone(),
            value: feature.value,
            projection_type: PROJECTION_TYPE.to_string(),
        }
    }

    pub(crate) fn same_key(&self, other: &Projection) -> bool {
        self.projection_type == other.projection_type && self.feature_name == other.feature_name
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{FeatureDefinition, ServiceLifetime};

    #[test]
    fn maps_only_persisted_fields() {
        let feature = FeatureDefinition::new("A", "the a flag")
            .service_lifetime(ServiceLifetime::Transient)
            .with_value(true);

        let projection = Projection::from_feature(&feature);

        assert_eq!(
            serde_json::to_value(&projection).unwrap(),
            serde_json::json!({
                "featureName": "A",
                "description": "the a flag",
                "value": true,
                "projectionType": "MongoBDProjection",
            })
        );
    }

    #[test]
    fn keys_on_type_and_name() {
        let a = Projection::from_feature(&FeatureDefinition::new("A", "").with_value(true));
        let a2 = Projection::from_feature(&FeatureDefinition::new("A", "x").with_value(false));
        let mut other_type = a.clone();
        other_type.projection_type = "Other".into();

        assert!(a.same_key(&a2));
        assert!(!a.same_key(&other_type));
    }
}
