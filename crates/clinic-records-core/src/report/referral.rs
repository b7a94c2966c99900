//! Referral listing.

use serde::{Deserialize, Serialize};

use super::DateRange;
use crate::models::Observation;

/// A referral destination and how many referrals it received in range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacilityCount {
    pub facility: String,
    pub referrals_in_range: usize,
}

/// Referrals made in a period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralReport {
    pub range: DateRange,
    /// Active referral observations inside the range, in date order
    pub referrals: Vec<Observation>,
    /// Every destination ever referred to, first encounter first
    pub facilities: Vec<FacilityCount>,
}

impl ReferralReport {
    pub fn total(&self) -> usize {
        self.referrals.len()
    }
}

/// Build a referral report.
///
/// `history` supplies the facility universe and may span any period;
/// `observations` are filtered to `range`.
pub fn referral_report(
    observations: &[Observation],
    history: &[Observation],
    range: DateRange,
) -> ReferralReport {
    let mut referrals: Vec<Observation> = observations
        .iter()
        .filter(|o| o.is_active() && range.contains(o.recorded_at))
        .cloned()
        .collect();
    referrals.sort_by_key(|o| o.recorded_at);

    let mut facilities: Vec<FacilityCount> = Vec::new();
    for obs in history.iter().chain(referrals.iter()).filter(|o| o.is_active()) {
        if !facilities.iter().any(|f| f.facility == obs.category) {
            facilities.push(FacilityCount {
                facility: obs.category.clone(),
                referrals_in_range: 0,
            });
        }
    }
    for facility in &mut facilities {
        facility.referrals_in_range = referrals
            .iter()
            .filter(|o| o.category == facility.facility)
            .count();
    }

    ReferralReport {
        range,
        referrals,
        facilities,
    }
}
