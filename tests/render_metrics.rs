mod support;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use postergen::application::{
    jobs::{CancellationListener, RenderJob, execute_render_job},
    render::RenderOutcome,
};
use postergen::domain::types::PosterStatus;

use support::{PageScript, WorkerHarness, props, quick_policy};

#[tokio::test]
async fn render_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let harness = WorkerHarness::new(
        [
            PageScript::Report("tiles missing".to_string()),
            PageScript::Ready {
                width: 300.0,
                height: 300.0,
            },
        ],
        quick_policy(3),
    );
    let build = harness.store.seed_build("Kamppi");
    let poster = harness.store.seed_poster(build.id, PosterStatus::Pending);

    let outcome = execute_render_job(&harness.context, RenderJob::new(poster.id, props())).await;
    assert_eq!(outcome, Some(RenderOutcome::Rendered { attempts: 2 }));

    // Cancellation matching the running job on this worker.
    let listener =
        CancellationListener::new(harness.context.current.clone(), harness.sessions.clone());
    let _current = harness.context.current.enter(poster.id);
    assert!(listener.handle(poster.id).await);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "postergen_render_attempts_total",
        "postergen_render_attempt_ms",
        "postergen_render_outcomes_total",
        "postergen_browser_launches_total",
        "postergen_cancellations_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
