//! Buffer size candidate resolution and snapping.
//!
//! Computes which buffer sizes are offerable for a device and maps arbitrary
//! requested values onto a supported one.

/// Fixed ascending candidate ladder of buffer sizes in frames.
pub const BUFFER_SIZE_LADDER: [u32; 7] = [64, 128, 256, 512, 1024, 2048, 4096];

/// Resolve the set of selectable buffer sizes for a device.
///
/// `range` is the device-reported `(min, max)` frame count range, when known.
/// `exclusive_mode` is true for driver-locked backends where the device
/// dictates a fixed size. `active` is the buffer size the running engine
/// reports, if any; it is always included because the engine's own report is
/// authoritative and must remain selectable.
pub fn resolve_buffer_sizes(
    range: Option<(u32, u32)>,
    exclusive_mode: bool,
    active: Option<u32>,
) -> Vec<u32> {
    let mut sizes: Vec<u32> = match range {
        None => {
            if exclusive_mode {
                // The driver owns the size; nothing to offer.
                Vec::new()
            } else {
                BUFFER_SIZE_LADDER.to_vec()
            }
        }
        Some((min, max)) => {
            let in_range: Vec<u32> = BUFFER_SIZE_LADDER
                .iter()
                .copied()
                .filter(|&s| s >= min && s <= max)
                .collect();
            if in_range.is_empty() {
                if min == max { vec![min] } else { vec![min, max] }
            } else {
                in_range
            }
        }
    };

    if let Some(active) = active {
        if !sizes.contains(&active) {
            sizes.push(active);
        }
    }

    sizes.sort_unstable();
    sizes
}

/// Snap a desired buffer size to the nearest member of `candidates`.
///
/// Ties break toward the smaller value. Returns `None` when the candidate
/// set is empty.
pub fn snap_buffer_size(candidates: &[u32], desired: u32) -> Option<u32> {
    candidates.iter().copied().min_by_key(|&c| {
        let distance = c.abs_diff(desired);
        // Secondary key prefers the smaller candidate on equal distance.
        (distance, c)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_shared_mode_offers_full_ladder() {
        let sizes = resolve_buffer_sizes(None, false, None);
        assert_eq!(sizes, BUFFER_SIZE_LADDER.to_vec());
    }

    #[test]
    fn no_range_exclusive_mode_offers_nothing() {
        let sizes = resolve_buffer_sizes(None, true, None);
        assert!(sizes.is_empty());
    }

    #[test]
    fn range_filters_ladder_members() {
        let sizes = resolve_buffer_sizes(Some((128, 1024)), false, None);
        assert_eq!(sizes, vec![128, 256, 512, 1024]);
    }

    #[test]
    fn range_without_ladder_members_falls_back_to_endpoints() {
        let sizes = resolve_buffer_sizes(Some((100, 200)), false, None);
        assert_eq!(sizes, vec![100, 200]);
    }

    #[test]
    fn degenerate_range_yields_single_endpoint() {
        let sizes = resolve_buffer_sizes(Some((96, 96)), false, None);
        assert_eq!(sizes, vec![96]);
    }

    #[test]
    fn active_size_is_always_included() {
        let sizes = resolve_buffer_sizes(Some((128, 512)), false, Some(48));
        assert_eq!(sizes, vec![48, 128, 256, 512]);

        let sizes = resolve_buffer_sizes(None, true, Some(272));
        assert_eq!(sizes, vec![272]);
    }

    #[test]
    fn active_size_is_not_duplicated() {
        let sizes = resolve_buffer_sizes(Some((128, 512)), false, Some(256));
        assert_eq!(sizes, vec![128, 256, 512]);
    }

    #[test]
    fn resolved_sizes_stay_within_range_except_active() {
        for &(min, max) in &[(64u32, 4096u32), (100, 200), (150, 3000), (5000, 9000)] {
            let sizes = resolve_buffer_sizes(Some((min, max)), false, Some(7));
            for &s in &sizes {
                assert!(
                    (s >= min && s <= max) || s == 7,
                    "size {s} outside [{min},{max}]"
                );
            }
        }
    }

    #[test]
    fn snap_picks_nearest_member() {
        let candidates = vec![64, 128, 256, 512];
        assert_eq!(snap_buffer_size(&candidates, 300), Some(256));
        assert_eq!(snap_buffer_size(&candidates, 500), Some(512));
        assert_eq!(snap_buffer_size(&candidates, 64), Some(64));
    }

    #[test]
    fn snap_breaks_ties_toward_smaller_value() {
        let candidates = vec![128, 256];
        assert_eq!(snap_buffer_size(&candidates, 192), Some(128));
    }

    #[test]
    fn snap_on_empty_set_returns_none() {
        assert_eq!(snap_buffer_size(&[], 512), None);
    }
}
