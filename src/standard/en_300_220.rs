//! EN 300 220-1 measurement parameters and limit masks
//!
//! Pure functions: the same inputs always produce identical outputs.

use serde::{Deserialize, Serialize};

/// Level of the out-of-band limit far from the channel, dBm
pub const OUT_OF_BAND_LIMIT_DBM: f64 = -36.0;

/// Level at the channel or band edge, dBm
pub const EDGE_LIMIT_DBM: f64 = 0.0;

/// Level inside the channel or band, dBm
pub const IN_BAND_LIMIT_DBM: f64 = 14.0;

/// Offsets of the operational band mask corners from the band edges
const BAND_MASK_OUTER_OFFSET_HZ: u64 = 400_000;
const BAND_MASK_INNER_OFFSET_HZ: u64 = 200_000;

/// Minimum resolution bandwidth for the occupied bandwidth measurement
const OBW_MIN_RBW_HZ: f64 = 100.0;

/// Analyzer detector modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
    AutoPeak,
    Negative,
    Positive,
    Sample,
    Rms,
    Average,
    QuasiPeak,
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Detector::AutoPeak => "apeak",
            Detector::Negative => "negative",
            Detector::Positive => "positive",
            Detector::Sample => "sample",
            Detector::Rms => "rms",
            Detector::Average => "average",
            Detector::QuasiPeak => "qpeak",
        };
        write!(f, "{name}")
    }
}

/// Analyzer settings for the occupied bandwidth measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObwParameters {
    pub resolution_bandwidth: f64,
    pub video_bandwidth_ratio: u32,
    pub span: u64,
    pub detector: Detector,
}

/// Analyzer settings for the out-of-band emissions measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OobParameters {
    pub resolution_bandwidth: f64,
    pub span: u64,
    pub detector: Detector,
}

/// One breakpoint of a limit line
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitPoint {
    pub frequency: u64,
    pub level_dbm: f64,
}

impl LimitPoint {
    pub fn new(frequency: u64, level_dbm: f64) -> Self {
        Self {
            frequency,
            level_dbm,
        }
    }
}

/// Ordered limit line breakpoints
pub type LimitMask = Vec<LimitPoint>;

/// Analyzer centre and span covering a frequency window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerView {
    pub center: u64,
    pub span: u64,
}

/// Occupied bandwidth settings: RBW is 2% of the channel width, at least 100 Hz.
pub fn occupied_bandwidth_parameters(channel_width: u64) -> ObwParameters {
    let proportional = 0.02 * channel_width as f64;
    let resolution_bandwidth = if proportional <= OBW_MIN_RBW_HZ {
        OBW_MIN_RBW_HZ
    } else {
        proportional
    };

    ObwParameters {
        resolution_bandwidth,
        video_bandwidth_ratio: 3,
        span: 3 * channel_width,
        detector: Detector::Rms,
    }
}

/// Out-of-band emission settings
pub fn out_of_band_parameters(channel_width: u64) -> OobParameters {
    OobParameters {
        resolution_bandwidth: 1000.0,
        span: 6 * channel_width,
        detector: Detector::Rms,
    }
}

/// Trapezoidal mask around the operating channel.
///
/// -36 dBm at 2.5 widths from centre, stepping from 0 to 14 dBm at the
/// channel edges. Frequencies are truncated to whole hertz.
pub fn operating_channel_mask(center_frequency: u64, channel_width: u64) -> LimitMask {
    let f = center_frequency as f64;
    let w = channel_width as f64;
    let at = |offset: f64| (f + offset * w) as u64;

    vec![
        LimitPoint::new(at(-2.5), OUT_OF_BAND_LIMIT_DBM),
        LimitPoint::new(at(-0.5), EDGE_LIMIT_DBM),
        LimitPoint::new(at(-0.5), IN_BAND_LIMIT_DBM),
        LimitPoint::new(at(0.5), IN_BAND_LIMIT_DBM),
        LimitPoint::new(at(0.5), EDGE_LIMIT_DBM),
        LimitPoint::new(at(2.5), OUT_OF_BAND_LIMIT_DBM),
    ]
}

/// Mask around the operational frequency band edges
pub fn operational_band_mask(lower_edge: u64, upper_edge: u64) -> LimitMask {
    vec![
        LimitPoint::new(
            lower_edge.saturating_sub(BAND_MASK_OUTER_OFFSET_HZ),
            OUT_OF_BAND_LIMIT_DBM,
        ),
        LimitPoint::new(
            lower_edge.saturating_sub(BAND_MASK_INNER_OFFSET_HZ),
            OUT_OF_BAND_LIMIT_DBM,
        ),
        LimitPoint::new(lower_edge, EDGE_LIMIT_DBM),
        LimitPoint::new(lower_edge, IN_BAND_LIMIT_DBM),
        LimitPoint::new(upper_edge, IN_BAND_LIMIT_DBM),
        LimitPoint::new(upper_edge, EDGE_LIMIT_DBM),
        LimitPoint::new(
            upper_edge + BAND_MASK_INNER_OFFSET_HZ,
            OUT_OF_BAND_LIMIT_DBM,
        ),
        LimitPoint::new(
            upper_edge + BAND_MASK_OUTER_OFFSET_HZ,
            OUT_OF_BAND_LIMIT_DBM,
        ),
    ]
}

/// Analyzer view spanning the whole operational band mask
pub fn operational_band_view(lower_edge: u64, upper_edge: u64) -> AnalyzerView {
    AnalyzerView {
        center: lower_edge + (upper_edge - lower_edge) / 2,
        span: upper_edge - lower_edge + 2 * BAND_MASK_OUTER_OFFSET_HZ,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(mask: &LimitMask) -> Vec<f64> {
        mask.iter().map(|p| p.level_dbm).collect()
    }

    #[test]
    fn test_obw_rbw_floor() {
        assert_eq!(occupied_bandwidth_parameters(1_000).resolution_bandwidth, 100.0);
        assert_eq!(occupied_bandwidth_parameters(12_500).resolution_bandwidth, 250.0);
    }

    #[test]
    fn test_obw_rbw_boundary() {
        assert_eq!(occupied_bandwidth_parameters(4_999).resolution_bandwidth, 100.0);
        assert_eq!(occupied_bandwidth_parameters(5_000).resolution_bandwidth, 100.0);
        assert!(occupied_bandwidth_parameters(5_001).resolution_bandwidth > 100.0);
    }

    #[test]
    fn test_obw_rbw_is_max_of_floor_and_two_percent() {
        for w in (100..2_000_000u64).step_by(7_919) {
            let rbw = occupied_bandwidth_parameters(w).resolution_bandwidth;
            assert_eq!(rbw, f64::max(100.0, 0.02 * w as f64), "width {w}");
        }
    }

    #[test]
    fn test_obw_parameters() {
        let p = occupied_bandwidth_parameters(25_000);
        assert_eq!(p.video_bandwidth_ratio, 3);
        assert_eq!(p.span, 75_000);
        assert_eq!(p.detector, Detector::Rms);
    }

    #[test]
    fn test_oob_parameters() {
        let p = out_of_band_parameters(12_500);
        assert_eq!(p.resolution_bandwidth, 1000.0);
        assert_eq!(p.span, 75_000);
        assert_eq!(p.detector, Detector::Rms);
    }

    #[test]
    fn test_operating_channel_mask_symmetry() {
        for (f, w) in [(169_612_500u64, 12_500u64), (433_920_000, 25_000), (868_300_000, 600_000)] {
            let mask = operating_channel_mask(f, w);
            assert_eq!(mask.len(), 6);
            assert_eq!(levels(&mask), vec![-36.0, 0.0, 14.0, 14.0, 0.0, -36.0]);
            for i in 0..3 {
                let low = mask[i].frequency;
                let high = mask[5 - i].frequency;
                assert_eq!(f - low, high - f, "point {i} for {f}/{w}");
            }
        }
    }

    #[test]
    fn test_operating_channel_mask_truncates() {
        // 2.5 * 333 = 832.5 Hz, truncated toward zero
        let mask = operating_channel_mask(1_000_000, 333);
        assert_eq!(mask[0].frequency, 999_167);
        assert_eq!(mask[5].frequency, 1_000_832);
    }

    #[test]
    fn test_operational_band_mask() {
        let mask = operational_band_mask(169_400_000, 169_812_500);
        assert_eq!(mask.len(), 8);
        assert_eq!(
            levels(&mask),
            vec![-36.0, -36.0, 0.0, 14.0, 14.0, 0.0, -36.0, -36.0]
        );
        let center = (169_400_000 + 169_812_500) / 2;
        for i in 0..4 {
            assert_eq!(
                center - mask[i].frequency,
                mask[7 - i].frequency - center,
                "point {i}"
            );
        }
        assert_eq!(mask[0].frequency, 169_000_000);
        assert_eq!(mask[1].frequency, 169_200_000);
        assert_eq!(mask[7].frequency, 170_212_500);
    }

    #[test]
    fn test_masks_are_deterministic() {
        assert_eq!(
            operating_channel_mask(869_525_000, 250_000),
            operating_channel_mask(869_525_000, 250_000)
        );
        assert_eq!(
            operational_band_mask(869_400_000, 869_650_000),
            operational_band_mask(869_400_000, 869_650_000)
        );
    }

    #[test]
    fn test_operational_band_view_covers_mask() {
        let view = operational_band_view(869_400_000, 869_650_000);
        let mask = operational_band_mask(869_400_000, 869_650_000);
        assert_eq!(view.center - view.span / 2, mask[0].frequency);
        assert_eq!(view.center + view.span / 2, mask[7].frequency);
    }

    #[test]
    fn test_reference_scenario() {
        let obw = occupied_bandwidth_parameters(12_500);
        assert_eq!(obw.resolution_bandwidth, 250.0);
        assert_eq!(obw.span, 37_500);

        let mask = operating_channel_mask(169_612_500, 12_500);
        let freqs: Vec<u64> = mask.iter().map(|p| p.frequency).collect();
        assert_eq!(
            freqs,
            vec![
                169_581_250,
                169_606_250,
                169_606_250,
                169_618_750,
                169_618_750,
                169_643_750
            ]
        );
    }
}
