use crate::models::{Category, ThresholdBands, ThresholdPolicy};

/// Classify a value against a resolved policy.
///
/// Bounds are inclusive and checked Normal first, then Borderline. Anything
/// else, including values outside every band, is Abnormal.
pub fn categorize(value: f64, policy: &ThresholdPolicy) -> Category {
    categorize_bands(value, &policy.bands)
}

pub fn categorize_bands(value: f64, bands: &ThresholdBands) -> Category {
    if (bands.normal_low..=bands.normal_high).contains(&value) {
        Category::Normal
    } else if (bands.borderline_low..=bands.borderline_high).contains(&value) {
        Category::Borderline
    } else {
        Category::Abnormal
    }
}
