//! Dependency resolution over a view's declared features.

use featplan_core::prelude::*;

/// Flatten the declared features into evaluation order: every feature's
/// transitive inputs come before it, each feature appears at most once
/// (by structural identity), and declared features are always included.
/// Diamond dependencies dedup naturally through the contains check.
pub fn dependent_features(features: &[Feature]) -> Vec<Feature> {
    let mut ordered: Vec<Feature> = Vec::new();
    for feature in features {
        push_with_inputs(feature, &mut ordered);
    }
    ordered
}

fn push_with_inputs(feature: &Feature, ordered: &mut Vec<Feature>) {
    for input in &feature.input_features {
        push_with_inputs(input, ordered);
    }
    if !ordered.contains(feature) {
        ordered.push(feature.clone());
    }
}
