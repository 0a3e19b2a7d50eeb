use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Slot durations an event may be configured with, in minutes.
pub const ALLOWED_SLOT_MINUTES: [i32; 4] = [15, 20, 30, 60];

/// Max simultaneous pending + confirmed bookings per allocation. Fixed business
/// policy, no configuration path.
pub const MAX_ACTIVE_BOOKINGS: i64 = 2;

pub fn is_allowed_duration(minutes: i32) -> bool {
    ALLOWED_SLOT_MINUTES.contains(&minutes)
}

/// Tiles the event window `[start, end)` on `date` into consecutive
/// fixed-length intervals. A trailing remainder shorter than `minutes` is
/// discarded, so the count is always `floor((end - start) / minutes)`.
pub fn tile_window(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    minutes: i32,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let step = Duration::minutes(minutes as i64);
    let window_end = date.and_time(end);
    let mut cursor = date.and_time(start);
    let mut out = Vec::new();

    while cursor + step <= window_end {
        out.push((cursor, cursor + step));
        cursor += step;
    }

    out
}

/// Strict half-open interval overlap. Intervals that merely touch at a
/// boundary do not overlap.
pub fn overlaps(
    start_a: NaiveDateTime,
    end_a: NaiveDateTime,
    start_b: NaiveDateTime,
    end_b: NaiveDateTime,
) -> bool {
    start_a < end_b && start_b < end_a
}

/// Whether a slot falls inside a bulk claim range: the slot must start no
/// earlier than the range start and end no later than the range end.
pub fn slot_in_range(
    slot_start: NaiveTime,
    slot_end: NaiveTime,
    range_start: NaiveTime,
    range_end: NaiveTime,
) -> bool {
    slot_start >= range_start && slot_end <= range_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn tiling_discards_partial_trailing_slot() {
        let slots = tile_window(date(), t(9, 0), t(10, 10), 30);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0], (date().and_time(t(9, 0)), date().and_time(t(9, 30))));
        assert_eq!(slots[1], (date().and_time(t(9, 30)), date().and_time(t(10, 0))));
    }

    #[test]
    fn tiling_is_contiguous_and_exact() {
        let slots = tile_window(date(), t(9, 0), t(12, 0), 20);
        assert_eq!(slots.len(), 9);
        for (start, end) in &slots {
            assert_eq!(*end - *start, Duration::minutes(20));
            assert!(*end <= date().and_time(t(12, 0)));
        }
        for pair in slots.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn tiling_empty_when_duration_exceeds_window() {
        assert!(tile_window(date(), t(9, 0), t(9, 10), 15).is_empty());
        assert!(tile_window(date(), t(9, 0), t(9, 0), 15).is_empty());
    }

    #[test]
    fn exact_fit_produces_single_slot() {
        let slots = tile_window(date(), t(9, 0), t(10, 0), 60);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].1, date().and_time(t(10, 0)));
    }

    #[test]
    fn overlap_is_strict() {
        let d = date();
        let a = (d.and_time(t(9, 0)), d.and_time(t(9, 30)));
        let b = (d.and_time(t(9, 15)), d.and_time(t(9, 45)));
        let c = (d.and_time(t(9, 30)), d.and_time(t(10, 0)));

        assert!(overlaps(a.0, a.1, b.0, b.1));
        assert!(overlaps(b.0, b.1, a.0, a.1));
        // Touching at 09:30 is not an overlap.
        assert!(!overlaps(a.0, a.1, c.0, c.1));
        assert!(!overlaps(c.0, c.1, a.0, a.1));
        // An interval overlaps itself.
        assert!(overlaps(a.0, a.1, a.0, a.1));
    }

    #[test]
    fn range_selection_requires_full_containment() {
        // Slots 09:00-09:30, 09:30-10:00, 10:00-10:30 against range [09:00, 10:00].
        assert!(slot_in_range(t(9, 0), t(9, 30), t(9, 0), t(10, 0)));
        assert!(slot_in_range(t(9, 30), t(10, 0), t(9, 0), t(10, 0)));
        assert!(!slot_in_range(t(10, 0), t(10, 30), t(9, 0), t(10, 0)));
    }

    #[test]
    fn duration_whitelist() {
        for m in ALLOWED_SLOT_MINUTES {
            assert!(is_allowed_duration(m));
        }
        assert!(!is_allowed_duration(0));
        assert!(!is_allowed_duration(45));
        assert!(!is_allowed_duration(-30));
    }
}
