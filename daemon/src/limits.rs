use hubtool_types::HubModel;

/// The only limits a USBHub2x4 can apply, in microamps.
pub const HUB_2X4_LIMITS: [u32; 8] = [
    500_000, 900_000, 1_000_000, 1_200_000, 1_500_000, 1_800_000, 2_000_000, 2_500_000,
];

pub const HUB_3P_MIN_LIMIT: u32 = 1_000;
pub const HUB_3P_MAX_LIMIT: u32 = 4_095_000;
pub const HUB_3P_LIMIT_STEP: u32 = 1_000;

/// Turns a requested port current limit into one the connected model will actually accept.
pub fn quantize_current_limit(model: HubModel, microamps: u32) -> u32 {
    match model {
        HubModel::Hub2x4 => HUB_2X4_LIMITS
            .iter()
            .copied()
            .find(|limit| *limit >= microamps)
            .unwrap_or(HUB_2X4_LIMITS[HUB_2X4_LIMITS.len() - 1]),
        HubModel::Hub3Plus => {
            let clamped = microamps.clamp(HUB_3P_MIN_LIMIT, HUB_3P_MAX_LIMIT);
            let remainder = clamped % HUB_3P_LIMIT_STEP;
            if remainder == 0 {
                return clamped;
            }
            (clamped - remainder)
                .saturating_add(HUB_3P_LIMIT_STEP)
                .min(HUB_3P_MAX_LIMIT)
        }
        HubModel::Unknown => microamps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub2x4_rounds_up_to_a_supported_threshold() {
        assert_eq!(quantize_current_limit(HubModel::Hub2x4, 1_100_000), 1_200_000);
        assert_eq!(quantize_current_limit(HubModel::Hub2x4, 1_200_000), 1_200_000);
        assert_eq!(quantize_current_limit(HubModel::Hub2x4, 0), 500_000);
    }

    #[test]
    fn hub2x4_caps_at_the_highest_threshold() {
        assert_eq!(quantize_current_limit(HubModel::Hub2x4, 2_500_001), 2_500_000);
        assert_eq!(quantize_current_limit(HubModel::Hub2x4, u32::MAX), 2_500_000);
    }

    #[test]
    fn hub3p_clamps_to_its_range() {
        assert_eq!(quantize_current_limit(HubModel::Hub3Plus, 10), HUB_3P_MIN_LIMIT);
        assert_eq!(quantize_current_limit(HubModel::Hub3Plus, 5_000_000), HUB_3P_MAX_LIMIT);
    }

    #[test]
    fn hub3p_rounds_up_to_the_next_step() {
        assert_eq!(quantize_current_limit(HubModel::Hub3Plus, 1_500_001), 1_501_000);
        assert_eq!(quantize_current_limit(HubModel::Hub3Plus, 2_000_000), 2_000_000);
        assert_eq!(quantize_current_limit(HubModel::Hub3Plus, 4_094_500), HUB_3P_MAX_LIMIT);
    }

    #[test]
    fn unknown_models_pass_through() {
        assert_eq!(quantize_current_limit(HubModel::Unknown, 1_234_567), 1_234_567);
    }
}
