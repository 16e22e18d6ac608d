// Integration tests for playback scheduling
//
// Inbound frames arrive with arbitrary network jitter; the scheduler must
// still produce monotonically non-decreasing, non-overlapping start times,
// and an interruption must empty the active set and rewind the cursor.

use std::sync::Arc;
use warren_live::audio::codec::AGENT_OUTPUT_RATE;
use warren_live::audio::playback::{ManualClock, PlaybackScheduler};
use warren_live::PcmBuffer;

fn buffer(samples: usize) -> PcmBuffer {
    PcmBuffer {
        samples: vec![0.0; samples],
        sample_rate: AGENT_OUTPUT_RATE,
    }
}

#[test]
fn start_times_are_monotone_and_non_overlapping() {
    let clock = Arc::new(ManualClock::new());
    let mut scheduler = PlaybackScheduler::new(clock.clone());

    // Irregular arrivals: clock jumps around between frames
    let arrivals = [0.0, 0.01, 0.5, 0.50001, 2.0, 2.0, 3.5];
    let mut placements = Vec::new();

    for &at in &arrivals {
        clock.set(at);
        let cursor_before = scheduler.cursor_secs();
        let placement = scheduler.schedule(&buffer(2400)); // 0.1s each

        // start == max(previous cursor, playback clock now)
        assert!((placement.start_secs - cursor_before.max(at)).abs() < 1e-9);
        placements.push(placement);
    }

    for pair in placements.windows(2) {
        assert!(pair[1].start_secs >= pair[0].start_secs, "starts must not decrease");
        assert!(
            pair[1].start_secs >= pair[0].end_secs() - 1e-9,
            "scheduled frames must not overlap"
        );
    }
}

#[test]
fn single_frame_scenario_4000_samples_at_24k() {
    let clock = Arc::new(ManualClock::new());
    let mut scheduler = PlaybackScheduler::new(clock);

    let placement = scheduler.schedule(&buffer(4000));

    assert_eq!(scheduler.active_count(), 1);
    let expected = 4000.0 / 24_000.0; // ~0.1667s
    assert!((placement.duration_secs - expected).abs() < 1e-9);
    assert!((scheduler.cursor_secs() - expected).abs() < 1e-9);
}

#[test]
fn interruption_empties_tracking_and_resets_cursor() {
    let clock = Arc::new(ManualClock::new());
    let mut scheduler = PlaybackScheduler::new(clock);

    scheduler.schedule(&buffer(4000));
    scheduler.schedule(&buffer(4000));
    scheduler.schedule(&buffer(4000));
    assert_eq!(scheduler.active_count(), 3);

    scheduler.interrupt();

    assert_eq!(scheduler.active_count(), 0);
    assert_eq!(scheduler.cursor_secs(), 0.0);

    // The next frame schedules from scratch
    let placement = scheduler.schedule(&buffer(2400));
    assert_eq!(placement.start_secs, 0.0);
}

#[test]
fn bursty_arrivals_queue_back_to_back() {
    let clock = Arc::new(ManualClock::new());
    let mut scheduler = PlaybackScheduler::new(clock.clone());

    clock.set(1.0);
    let a = scheduler.schedule(&buffer(2400));
    let b = scheduler.schedule(&buffer(2400));
    let c = scheduler.schedule(&buffer(2400));

    assert_eq!(a.start_secs, 1.0);
    assert!((b.start_secs - a.end_secs()).abs() < 1e-9);
    assert!((c.start_secs - b.end_secs()).abs() < 1e-9);
}
