//! Daily quota gating.

use tracing::{debug, warn};
use uuid::Uuid;

use tidytask_core::{FeatureLimits, FeatureSet, Tier, UsageStore, UNLIMITED};

/// Remove every feature that is disabled for `tier` or has used up today's
/// allowance. A failed usage read counts as no usage.
///
/// The check is not reserved: usage is recorded only after the model call,
/// so concurrent runs for one owner can each pass the gate and overshoot the
/// daily limit by up to the number of runs in flight. Metering is best
/// effort.
pub async fn gate(
    limits: &FeatureLimits,
    usage: &dyn UsageStore,
    owner_id: Uuid,
    tier: Tier,
    selected: FeatureSet,
) -> FeatureSet {
    let mut allowed = FeatureSet::new();

    for feature in selected.iter() {
        match limits.limit(tier, feature) {
            0 => {
                debug!(%owner_id, %tier, %feature, "Feature disabled for tier");
                continue;
            }
            UNLIMITED => {
                allowed.insert(feature);
                continue;
            }
            _ => {}
        }

        let used = match usage.count_today(owner_id, feature).await {
            Ok(n) => n,
            Err(e) => {
                warn!(%owner_id, %feature, error = %e, "Usage lookup failed, assuming no usage");
                0
            }
        };

        if limits.allows(tier, feature, used) {
            allowed.insert(feature);
        } else {
            debug!(
                %owner_id,
                %tier,
                %feature,
                used,
                limit = limits.limit(tier, feature),
                "Daily limit reached"
            );
        }
    }

    allowed
}
