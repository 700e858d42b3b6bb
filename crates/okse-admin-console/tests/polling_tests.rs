//! Timer behavior of the router and scheduler against a paused clock.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{run_for, settle, Harness, Reply};
use okse_admin_console::RequestDefinition;
use okse_admin_protocol::{LogFilterPatch, Tab};
use serde_json::json;

const MAIN: &str = "main/get/all";
const TOPICS: &str = "topic/get/all";
const DEFAULT_LOG: &str = "log?logLevel=DEBUG&logID=0&length=250";

fn at(ms: u64, endpoint: &str) -> (u64, String) {
    (ms, endpoint.to_string())
}

#[tokio::test(start_paused = true)]
async fn test_switching_tabs_moves_the_timer() {
    let mut h = Harness::new();

    h.router.activate("main").unwrap();
    run_for(1500).await;
    h.router.activate("log").unwrap();
    run_for(1100).await;

    assert_eq!(
        h.transport.timeline(),
        vec![at(0, MAIN), at(1000, MAIN), at(1500, DEFAULT_LOG), at(2500, DEFAULT_LOG)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_only_one_timer_after_many_activations() {
    let mut h = Harness::new();
    let tabs = ["main", "topics", "statistics", "config", "subscribers", "log"];

    for i in 0..30 {
        h.router.activate(tabs[i % tabs.len()]).unwrap();
    }
    settle().await;
    assert_eq!(h.transport.calls().len(), 30, "one immediate request per activation");
    h.transport.clear();

    run_for(3000).await;
    let last = h.router.scheduler().active_handle().unwrap();
    assert_eq!(h.transport.endpoints(), vec![last.endpoint().to_string(); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_silences_polling() {
    let mut h = Harness::new();
    h.router.activate("topics").unwrap();
    h.scheduler().stop();
    h.scheduler().stop();

    run_for(5000).await;
    assert_eq!(h.transport.timeline(), vec![at(0, TOPICS)]);
    assert!(!h.scheduler().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_interval_below_floor_behaves_like_floor() {
    let expected: Vec<_> = [0, 500, 1000, 1500, 2000].iter().map(|ms| at(*ms, MAIN)).collect();

    let mut fast = Harness::new();
    fast.router.set_update_interval_secs(0.1);
    fast.router.activate("main").unwrap();
    run_for(2000).await;
    fast.scheduler().stop();
    assert_eq!(fast.transport.timeline(), expected);

    let mut floor = Harness::new();
    floor.router.set_update_interval_secs(0.5);
    floor.router.activate("main").unwrap();
    run_for(2000).await;
    assert_eq!(floor.transport.timeline(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_nonsense_interval_falls_back_to_floor() {
    let mut h = Harness::new();
    assert_eq!(h.router.set_update_interval_secs(f64::NAN), Duration::from_millis(500));
    assert_eq!(h.router.set_update_interval_secs(-3.0), Duration::from_millis(500));
    assert_eq!(h.router.set_update_interval_secs(2.5), Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_on_next_activation() {
    let mut h = Harness::new();
    h.router.activate("main").unwrap();
    h.router.set_update_interval_secs(3.0);
    run_for(1000).await;
    assert_eq!(h.transport.count(MAIN), 2, "running timer keeps its period");

    let handle = h.router.activate("main").unwrap();
    assert_eq!(handle.period(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_tab_leaves_timer_running() {
    let mut h = Harness::new();
    let before = h.router.activate("main").unwrap();

    assert!(h.router.select("bogus").is_err());
    let err = h.router.activate("bogus").unwrap_err();
    assert_eq!(err.0, "bogus");

    assert_eq!(h.scheduler().active_handle(), Some(before));
    assert_eq!(h.router.active_tab(), Some(Tab::Main));
    run_for(1000).await;
    assert_eq!(h.transport.timeline(), vec![at(0, MAIN), at(1000, MAIN)]);
}

#[tokio::test(start_paused = true)]
async fn test_select_does_not_touch_the_scheduler() {
    let h = Harness::new();
    let def = h.router.select("#Topics").unwrap();
    assert_eq!(def.endpoint(), TOPICS);
    settle().await;
    assert!(h.transport.calls().is_empty());
    assert!(!h.scheduler().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_log_filter_change_restarts_log_poll() {
    let mut h = Harness::new();
    h.router.activate("log").unwrap();
    run_for(500).await;

    let handle = h.router.update_log_filter(LogFilterPatch::level("error")).unwrap();
    let error_log = "log?logLevel=ERROR&logID=0&length=250";
    assert_eq!(handle.endpoint(), error_log);
    run_for(1000).await;

    assert_eq!(
        h.transport.timeline(),
        vec![at(0, DEFAULT_LOG), at(500, error_log), at(1500, error_log)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_log_filter_change_off_the_log_tab_only_updates_state() {
    let mut h = Harness::new();
    h.router.activate("main").unwrap();

    assert!(h.router.update_log_filter(LogFilterPatch::length(500)).is_none());
    assert_eq!(h.router.log_filter().length, 500);
    assert_eq!(h.scheduler().active_handle().unwrap().endpoint(), MAIN);

    h.router.activate("log").unwrap();
    assert_eq!(h.transport.endpoints().last().unwrap(), "log?logLevel=DEBUG&logID=0&length=500");
}

#[tokio::test(start_paused = true)]
async fn test_stop_log_refresh_keeps_filter() {
    let mut h = Harness::new();
    h.router.start_log_refresh();
    assert!(h.router.log_refresh_enabled());
    h.router.update_log_filter(LogFilterPatch::file_index(2));

    h.router.stop_log_refresh();
    assert!(!h.scheduler().is_active());
    assert!(!h.router.log_refresh_enabled());
    assert_eq!(h.router.log_filter().file_index, 2);

    let handle = h.router.start_log_refresh();
    assert_eq!(handle.endpoint(), "log?logLevel=DEBUG&logID=2&length=250");
}

#[tokio::test(start_paused = true)]
async fn test_leaving_log_tab_resets_refresh_toggle() {
    let mut h = Harness::new();
    h.router.start_log_refresh();
    h.router.activate("main").unwrap();

    assert!(!h.router.log_refresh_enabled());
    assert!(h.router.update_log_filter(LogFilterPatch::level("WARN")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_error_status_reaches_error_path_and_polling_continues() {
    let mut h = Harness::new();
    h.transport.script(MAIN, Reply::status(503));

    h.router.activate("main").unwrap();
    settle().await;
    let messages: Vec<String> =
        h.view.read(|v| v.messages.entries().map(|m| m.text.clone()).collect());
    assert_eq!(messages, vec!["Service unavailable.".to_string()]);

    run_for(1000).await;
    assert_eq!(h.transport.count(MAIN), 2);
    assert_eq!(h.view.read(|v| v.messages.len()), 2);
    assert!(h.view.read(|v| v.overview.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_response_lands_in_view() {
    let mut h = Harness::new();
    h.transport.script(
        MAIN,
        Reply::json(json!({ "subscribers": 4, "publishers": 1, "protocolPower": true })),
    );

    let revision = h.view.revision();
    h.router.activate("main").unwrap();
    settle().await;

    let overview = h.view.read(|v| v.overview.clone()).unwrap();
    assert_eq!(overview.subscribers, 4);
    assert_eq!(h.view.read(|v| v.protocol_power), Some(true));
    assert!(h.view.revision() > revision);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_is_discarded_after_switch() {
    let mut h = Harness::new();
    h.transport.script(
        MAIN,
        Reply::json(json!({ "subscribers": 9, "protocolPower": true })).after(Duration::from_millis(800)),
    );

    h.router.activate("main").unwrap();
    settle().await;
    run_for(300).await;
    h.router.activate("topics").unwrap();
    run_for(700).await;

    assert!(h.view.read(|v| v.overview.is_none()), "late main response must not render");
    assert_eq!(h.view.read(|v| v.protocol_power), None);
}

#[tokio::test(start_paused = true)]
async fn test_slow_response_is_applied_while_current() {
    let mut h = Harness::new();
    h.transport.script(
        MAIN,
        Reply::json(json!({ "subscribers": 9 })).after(Duration::from_millis(800)),
    );

    h.router.activate("main").unwrap();
    settle().await;
    run_for(900).await;
    assert_eq!(h.view.read(|v| v.overview.as_ref().map(|o| o.subscribers)), Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_response_after_stop_is_discarded() {
    let mut h = Harness::new();
    h.transport.script(
        MAIN,
        Reply::json(json!({ "subscribers": 9 })).after(Duration::from_millis(200)),
    );

    h.router.activate("main").unwrap();
    h.scheduler().stop();
    run_for(500).await;
    assert!(h.view.read(|v| v.overview.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_reentrant_start_from_callback() {
    let h = Harness::new();
    let scheduler = h.scheduler().clone();
    let inner = scheduler.clone();
    let fired = Arc::new(AtomicBool::new(false));

    let def = RequestDefinition::get(MAIN, move |_| {
        if !fired.swap(true, Ordering::SeqCst) {
            inner.start(RequestDefinition::get(TOPICS, |_| {}), Duration::from_secs(1));
        }
    });
    scheduler.start(def, Duration::from_secs(1));
    settle().await;
    run_for(2000).await;

    assert_eq!(
        h.transport.timeline(),
        vec![at(0, MAIN), at(0, TOPICS), at(1000, TOPICS), at(2000, TOPICS)]
    );
    assert_eq!(scheduler.active_handle().unwrap().endpoint(), TOPICS);
}

#[tokio::test(start_paused = true)]
async fn test_boot_loads_catalog_then_polls_startup_tab() {
    let mut h = Harness::new();
    h.transport.script("log/levels", Reply::json(json!(["DEBUG", "INFO", "WARN", "ERROR"])));
    h.transport.script("log/files", Reply::json(json!(["okse.log", "okse.log.1"])));

    h.router.boot(Tab::Topics);
    settle().await;

    assert_eq!(h.transport.endpoints(), vec!["log/levels", "log/files", TOPICS]);
    assert_eq!(h.view.read(|v| v.log_levels.len()), 4);
    assert_eq!(h.view.read(|v| v.log_files.clone()), vec!["okse.log", "okse.log.1"]);
    assert_eq!(h.router.active_tab(), Some(Tab::Topics));
}

#[tokio::test(start_paused = true)]
async fn test_bad_catalog_payload_keeps_empty_pickers() {
    let h = Harness::new();
    h.transport.script("log/levels", Reply::json(json!({ "levels": "all" })));

    h.router.load_log_catalog();
    settle().await;
    assert!(h.view.read(|v| v.log_levels.is_empty()));
    assert!(!h.scheduler().is_active(), "catalog load never arms the timer");
}
