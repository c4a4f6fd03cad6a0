//! Timing properties of the commitment gesture.

use holdfast_core::gesture::{GestureConfig, GestureOutput, GesturePhase, GestureStateMachine};
use holdfast_core::timer::TimerQueue;
use holdfast_core::TaskId;
use proptest::prelude::*;
use proptest::test_runner::Config;

/// Fire every due timer up to `until_ms`, collecting outputs with their time.
/// Also checks that progress stays within bounds and at most one timer runs.
fn drive(
    m: &mut GestureStateMachine,
    q: &mut TimerQueue,
    until_ms: u64,
) -> Vec<(u64, GestureOutput)> {
    let mut out = Vec::new();
    while let Some(fired) = q.pop_due(until_ms) {
        if let Some(o) = m.on_timer(q, fired.id, fired.at_ms) {
            out.push((fired.at_ms, o));
        }
        assert!((0.0..=100.0).contains(&m.progress()));
        assert!(q.active_count() <= 1);
    }
    out
}

fn panics(outputs: &[(u64, GestureOutput)]) -> Vec<u64> {
    outputs
        .iter()
        .filter(|(_, o)| matches!(o, GestureOutput::Panic(_)))
        .map(|(t, _)| *t)
        .collect()
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn early_release_depletes_by_release_plus_decay(hold in 0_u64..5_000) {
        let mut q = TimerQueue::new();
        let mut m = GestureStateMachine::default();
        m.press_start(&mut q, TaskId::from("read"), false, 0);
        drive(&mut m, &mut q, hold);
        let reached = m.progress();
        m.press_end(&mut q, hold);

        let out = drive(&mut m, &mut q, hold + 10_000);
        let fired = panics(&out);
        prop_assert_eq!(fired.len(), 1);
        prop_assert!(fired[0] <= hold + 2_500);
        if reached > 0.0 {
            prop_assert_eq!(fired[0], hold + 2_500);
        }
        prop_assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn sustained_hold_commits_exactly_once(hold in 5_000_u64..20_000) {
        let mut q = TimerQueue::new();
        let mut m = GestureStateMachine::default();
        m.press_start(&mut q, TaskId::from("water"), false, 0);
        let out = drive(&mut m, &mut q, hold);

        let commits: Vec<_> = out
            .iter()
            .filter(|(_, o)| matches!(o, GestureOutput::Committed(_)))
            .collect();
        prop_assert_eq!(commits.len(), 1);
        prop_assert_eq!(commits[0].0, 5_000);
        prop_assert_eq!(m.phase(), GesturePhase::Idle);
        prop_assert!(m.press_end(&mut q, hold).is_none());
        prop_assert!(panics(&drive(&mut m, &mut q, hold + 5_000)).is_empty());
    }

    #[test]
    fn any_tick_lands_commit_and_panic_on_window_end(
        tick in 1_u64..800,
        hold in 0_u64..5_000,
    ) {
        let cfg = GestureConfig { tick_ms: tick, ..GestureConfig::default() };

        let mut q = TimerQueue::new();
        let mut m = GestureStateMachine::new(cfg.clone());
        m.press_start(&mut q, TaskId::from("water"), false, 0);
        let commits: Vec<u64> = drive(&mut m, &mut q, 20_000)
            .iter()
            .filter(|(_, o)| matches!(o, GestureOutput::Committed(_)))
            .map(|(t, _)| *t)
            .collect();
        prop_assert_eq!(commits, vec![5_000]);

        let mut q = TimerQueue::new();
        let mut m = GestureStateMachine::new(cfg);
        m.press_start(&mut q, TaskId::from("read"), false, 0);
        drive(&mut m, &mut q, hold);
        let reached = m.progress();
        m.press_end(&mut q, hold);
        let fired = panics(&drive(&mut m, &mut q, hold + 10_000));
        prop_assert_eq!(fired.len(), 1);
        prop_assert!(fired[0] <= hold + 2_500);
        if reached > 0.0 {
            prop_assert_eq!(fired[0], hold + 2_500);
        }
    }

    #[test]
    fn presses_never_leave_two_timers(
        ops in proptest::collection::vec((0_u64..400, 0_u8..3, any::<bool>()), 1..40)
    ) {
        let mut q = TimerQueue::new();
        let mut m = GestureStateMachine::default();
        let mut now = 0;
        for (gap, task, press) in ops {
            now += gap;
            drive(&mut m, &mut q, now);
            if press {
                m.press_start(&mut q, TaskId::new(format!("t{task}")), false, now);
            } else {
                m.press_end(&mut q, now);
            }
            prop_assert!(q.active_count() <= 1);
            prop_assert_eq!(m.is_ticking(&q), q.active_count() == 1);
        }
        m.dispose(&mut q);
        prop_assert_eq!(q.active_count(), 0);
    }
}

#[test]
fn fresh_press_does_not_resume_decay() {
    let mut q = TimerQueue::new();
    let mut m = GestureStateMachine::default();
    m.press_start(&mut q, "a".into(), false, 0);
    drive(&mut m, &mut q, 2_000);
    m.press_end(&mut q, 2_000);
    drive(&mut m, &mut q, 2_500);
    assert!(m.progress() > 0.0);

    m.press_start(&mut q, "a".into(), false, 2_500);
    assert_eq!(m.progress(), 0.0);
    let out = drive(&mut m, &mut q, 7_500);
    assert!(matches!(out.as_slice(), [(7_500, GestureOutput::Committed(_))]));
}
