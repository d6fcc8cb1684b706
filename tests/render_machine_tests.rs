//! Render lifecycle walks with real timers on a paused clock.

use std::time::Duration;

use artifact_recovery::config::RenderConfig;
use artifact_recovery::render::RenderTransition;
use artifact_recovery::{ArtifactLanguage, RenderEvent, RenderState, RenderStateMachine};

const LADDER: [RenderEvent; 7] = [
    RenderEvent::Start,
    RenderEvent::Initialized,
    RenderEvent::Loaded,
    RenderEvent::Configured,
    RenderEvent::Mounted,
    RenderEvent::Bundled,
    RenderEvent::Rendered,
];

#[tokio::test]
async fn test_full_ladder_reaches_ready() {
    let machine = RenderStateMachine::new("component-1", RenderConfig::default())
        .with_language(ArtifactLanguage::Tsx);

    for event in LADDER {
        machine.apply(event).unwrap();
    }

    assert_eq!(machine.state(), RenderState::Ready);
    let snapshot = machine.snapshot();
    assert_eq!(snapshot.language, ArtifactLanguage::Tsx);
    assert_eq!(snapshot.retry_count, 0);
    assert!(snapshot.metrics.total_ms.is_some());
    // One timing bucket per phase passed through.
    assert_eq!(snapshot.metrics.phase_ms.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_phase_times_out_and_retry_recovers() {
    let machine = RenderStateMachine::new("component-1", RenderConfig::default());
    machine.start().unwrap();
    machine.apply(RenderEvent::Initialized).unwrap();
    assert_eq!(machine.state(), RenderState::Loading);

    // The loading phase stalls past its 15s budget.
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    tokio::task::yield_now().await;
    assert_eq!(machine.state(), RenderState::TimedOut);

    machine.retry().unwrap();
    assert_eq!(machine.state(), RenderState::Retrying);

    // After the 1.5s retry delay the machine re-enters initializing.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    tokio::task::yield_now().await;
    assert_eq!(machine.state(), RenderState::Initializing);
    assert_eq!(machine.snapshot().retry_count, 1);

    // This attempt completes.
    for event in &LADDER[1..] {
        machine.apply(*event).unwrap();
    }
    assert_eq!(machine.state(), RenderState::Ready);
}

#[tokio::test]
async fn test_retry_budget_is_a_hard_ceiling() {
    let config = RenderConfig {
        max_retries: 2,
        ..RenderConfig::default()
    };
    let machine = RenderStateMachine::new("component-1", config);
    machine.start().unwrap();

    for _ in 0..2 {
        machine.report_error("render crashed").unwrap();
        machine.retry().unwrap();
        machine.apply(RenderEvent::RetryDelayElapsed).unwrap();
    }
    machine.report_error("render crashed").unwrap();

    assert!(machine.retry().is_err());
    assert_eq!(machine.state(), RenderState::Errored);
    assert_eq!(machine.snapshot().retry_count, 2);
}

#[tokio::test]
async fn test_destroyed_machine_accepts_nothing() {
    let machine = RenderStateMachine::new("component-1", RenderConfig::default());
    machine.start().unwrap();
    machine.destroy();

    assert_eq!(machine.state(), RenderState::Destroyed);
    assert!(machine.apply(RenderEvent::Initialized).is_err());
    assert!(machine.retry().is_err());
    assert!(machine.reset().is_err());

    // Destroy again is a no-op.
    machine.destroy();
    assert_eq!(machine.state(), RenderState::Destroyed);
}

#[tokio::test]
async fn test_subscribers_see_transitions_in_order() {
    let machine = RenderStateMachine::new("component-1", RenderConfig::default());
    let mut rx = machine.subscribe();

    for event in LADDER {
        machine.apply(event).unwrap();
    }

    let mut seen: Vec<RenderTransition> = Vec::new();
    while let Ok(transition) = rx.try_recv() {
        seen.push(transition);
    }
    assert_eq!(seen.len(), 7);
    assert_eq!(seen[0].from, RenderState::Idle);
    assert_eq!(seen[6].to, RenderState::Ready);
    assert!(seen.windows(2).all(|w| w[0].to == w[1].from));
}
