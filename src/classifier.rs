//! Flight-category classification
//!
//! FAA thresholds, evaluated most restrictive first:
//!
//! | Category | Ceiling (ft AGL)   | Visibility (SM)  |
//! |----------|--------------------|------------------|
//! | LIFR     | below 500          | below 1          |
//! | IFR      | 500 to below 1000  | 1 to below 3     |
//! | MVFR     | 1000 to 3000       | 3 to 5           |
//! | VFR      | above 3000         | above 5          |

use crate::models::FlightCategory;

/// Cloud ceiling as derived from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceiling {
    /// Lowest broken/overcast layer or vertical visibility, in feet
    Feet(u32),
    /// Clouds were reported but none form a ceiling
    Unlimited,
}

/// Classify ceiling and visibility. Missing inputs yield `NoData`.
#[must_use]
pub fn classify(ceiling: Option<Ceiling>, visibility_sm: Option<f32>) -> FlightCategory {
    let (Some(ceiling), Some(visibility)) = (ceiling, visibility_sm) else {
        return FlightCategory::NoData;
    };
    if !visibility.is_finite() || visibility < 0.0 {
        return FlightCategory::NoData;
    }

    let by_ceiling = match ceiling {
        Ceiling::Feet(ft) if ft < 500 => FlightCategory::Lifr,
        Ceiling::Feet(ft) if ft < 1000 => FlightCategory::Ifr,
        Ceiling::Feet(ft) if ft <= 3000 => FlightCategory::Mvfr,
        _ => FlightCategory::Vfr,
    };

    let by_visibility = if visibility < 1.0 {
        FlightCategory::Lifr
    } else if visibility < 3.0 {
        FlightCategory::Ifr
    } else if visibility <= 5.0 {
        FlightCategory::Mvfr
    } else {
        FlightCategory::Vfr
    };

    worst(by_ceiling, by_visibility)
}

/// Classify, falling back to a category code reported alongside the data.
#[must_use]
pub fn classify_or_reported(
    ceiling: Option<Ceiling>,
    visibility_sm: Option<f32>,
    reported: Option<&str>,
) -> FlightCategory {
    match classify(ceiling, visibility_sm) {
        FlightCategory::NoData => reported
            .and_then(FlightCategory::from_code)
            .unwrap_or(FlightCategory::NoData),
        category => category,
    }
}

/// Derive the ceiling from `(cover, base_ft)` layers and an optional vertical visibility.
///
/// `None` when no cloud information was reported at all, or when a broken or
/// overcast layer has no base and no vertical visibility stands in for it.
#[must_use]
pub fn ceiling_from_layers<'a, I>(layers: Option<I>, vertical_visibility_ft: Option<u32>) -> Option<Ceiling>
where
    I: IntoIterator<Item = (&'a str, Option<u32>)>,
{
    let layer_ceiling = layers.map(|layers| {
        let mut lowest: Option<u32> = None;
        let mut missing_base = false;
        for (cover, base) in layers {
            if !matches!(cover.trim().to_ascii_uppercase().as_str(), "BKN" | "OVC" | "OVX" | "VV") {
                continue;
            }
            match base {
                Some(base) => lowest = Some(lowest.map_or(base, |low| low.min(base))),
                None => missing_base = true,
            }
        }
        (lowest, missing_base)
    });

    match (layer_ceiling, vertical_visibility_ft) {
        (Some((Some(layer), _)), Some(vv)) => Some(Ceiling::Feet(layer.min(vv))),
        (_, Some(vv)) => Some(Ceiling::Feet(vv)),
        (Some((_, true)), None) => None,
        (Some((Some(layer), false)), None) => Some(Ceiling::Feet(layer)),
        (Some((None, false)), None) => Some(Ceiling::Unlimited),
        (None, None) => None,
    }
}

fn severity(category: FlightCategory) -> u8 {
    match category {
        FlightCategory::Vfr => 0,
        FlightCategory::Mvfr => 1,
        FlightCategory::Ifr => 2,
        FlightCategory::Lifr => 3,
        FlightCategory::NoData => 4,
    }
}

fn worst(a: FlightCategory, b: FlightCategory) -> FlightCategory {
    if severity(a) >= severity(b) { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Ceiling::Feet(600), 0.5, FlightCategory::Lifr)]
    #[case(Ceiling::Feet(400), 10.0, FlightCategory::Lifr)]
    #[case(Ceiling::Feet(499), 10.0, FlightCategory::Lifr)]
    #[case(Ceiling::Feet(500), 10.0, FlightCategory::Ifr)]
    #[case(Ceiling::Feet(999), 10.0, FlightCategory::Ifr)]
    #[case(Ceiling::Feet(1000), 10.0, FlightCategory::Mvfr)]
    #[case(Ceiling::Feet(3000), 10.0, FlightCategory::Mvfr)]
    #[case(Ceiling::Feet(3100), 10.0, FlightCategory::Vfr)]
    #[case(Ceiling::Unlimited, 10.0, FlightCategory::Vfr)]
    #[case(Ceiling::Unlimited, 5.0, FlightCategory::Mvfr)]
    #[case(Ceiling::Unlimited, 2.5, FlightCategory::Ifr)]
    #[case(Ceiling::Unlimited, 0.75, FlightCategory::Lifr)]
    #[case(Ceiling::Feet(2500), 1.5, FlightCategory::Ifr)]
    fn test_thresholds(
        #[case] ceiling: Ceiling,
        #[case] visibility: f32,
        #[case] expected: FlightCategory,
    ) {
        assert_eq!(classify(Some(ceiling), Some(visibility)), expected);
    }

    #[test]
    fn test_missing_inputs_are_nodata() {
        assert_eq!(classify(None, Some(10.0)), FlightCategory::NoData);
        assert_eq!(classify(Some(Ceiling::Unlimited), None), FlightCategory::NoData);
        assert_eq!(classify(Some(Ceiling::Unlimited), Some(f32::NAN)), FlightCategory::NoData);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let first = classify(Some(Ceiling::Feet(800)), Some(4.0));
        let second = classify(Some(Ceiling::Feet(800)), Some(4.0));
        assert_eq!(first, second);
        assert_eq!(first, FlightCategory::Ifr);
    }

    #[test]
    fn test_reported_fallback() {
        assert_eq!(
            classify_or_reported(None, None, Some("MVFR")),
            FlightCategory::Mvfr
        );
        assert_eq!(classify_or_reported(None, None, Some("")), FlightCategory::NoData);
        assert_eq!(
            classify_or_reported(Some(Ceiling::Feet(300)), Some(10.0), Some("VFR")),
            FlightCategory::Lifr
        );
    }

    #[test]
    fn test_ceiling_from_layers() {
        let layers = vec![("FEW", Some(800)), ("BKN", Some(2500)), ("OVC", Some(1200))];
        assert_eq!(
            ceiling_from_layers(Some(layers), None),
            Some(Ceiling::Feet(1200))
        );

        let scattered = vec![("SCT", Some(800))];
        assert_eq!(
            ceiling_from_layers(Some(scattered), None),
            Some(Ceiling::Unlimited)
        );

        let clear: Vec<(&str, Option<u32>)> = vec![("CLR", None)];
        assert_eq!(ceiling_from_layers(Some(clear), Some(200)), Some(Ceiling::Feet(200)));

        assert_eq!(ceiling_from_layers::<Vec<(&str, Option<u32>)>>(None, None), None);
    }

    #[rstest]
    #[case(vec![("OVC", None)], None, None)]
    #[case(vec![("FEW", Some(900)), ("BKN", None)], None, None)]
    #[case(vec![("BKN", Some(4000)), ("OVC", None)], None, None)]
    #[case(vec![("VV", None)], Some(300), Some(Ceiling::Feet(300)))]
    #[case(vec![("BKN", Some(800)), ("OVC", None)], Some(1500), Some(Ceiling::Feet(800)))]
    #[case(vec![("SCT", None)], None, Some(Ceiling::Unlimited))]
    fn test_ceiling_layer_without_base(
        #[case] layers: Vec<(&'static str, Option<u32>)>,
        #[case] vertical_visibility: Option<u32>,
        #[case] expected: Option<Ceiling>,
    ) {
        assert_eq!(ceiling_from_layers(Some(layers), vertical_visibility), expected);
    }

    #[test]
    fn test_baseless_overcast_falls_back_to_reported() {
        let ceiling = ceiling_from_layers(Some(vec![("OVC", None)]), None);
        assert_eq!(classify_or_reported(ceiling, Some(10.0), Some("IFR")), FlightCategory::Ifr);
        assert_eq!(classify_or_reported(ceiling, Some(10.0), None), FlightCategory::NoData);
    }
}
