#![cfg(target_arch = "wasm32")]

use cmmi_game::{KeyValueStorage, MaturityLevel, ScoreDraft, Suite, SuiteConfig};
use cmmi_web::app::WebApp;
use cmmi_web::storage::BrowserStorage;
use std::rc::Rc;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn local_storage_round_trips_items() {
    let storage = BrowserStorage::local().unwrap();
    storage.set_item("cmmi_test_key", "value").unwrap();
    assert_eq!(
        storage.get_item("cmmi_test_key").unwrap().as_deref(),
        Some("value")
    );
    storage.remove_item("cmmi_test_key").unwrap();
    assert_eq!(storage.get_item("cmmi_test_key").unwrap(), None);
}

#[wasm_bindgen_test]
async fn suite_records_into_local_storage() {
    let config = SuiteConfig {
        storage_prefix: "cmmi_wasm_test".into(),
        ..SuiteConfig::default()
    };
    let suite = Suite::local_only(Rc::new(BrowserStorage::local().unwrap()), config);
    suite.scores().clear_all().await;

    let record = suite
        .scores()
        .record(ScoreDraft::new("Wasm", MaturityLevel::Initial.game(), 6, 7))
        .await
        .unwrap();
    assert_eq!(record.percentage, 86);

    let raw = BrowserStorage::local()
        .unwrap()
        .get_item("cmmi_wasm_test_scores")
        .unwrap()
        .unwrap();
    assert!(raw.contains("\"playerName\":\"Wasm\""));
    suite.scores().clear_all().await;
}

#[wasm_bindgen_test]
async fn started_app_keeps_the_player_in_session_storage() {
    let config = SuiteConfig {
        storage_prefix: "cmmi_wasm_app".into(),
        ..SuiteConfig::default()
    };
    let app = WebApp::start(config, None).unwrap();
    app.suite().identities().clear_identities().await.unwrap();
    app.suite().identities().register("Tab").await.unwrap();

    let tab = BrowserStorage::session().unwrap();
    let local = BrowserStorage::local().unwrap();
    assert_eq!(
        tab.get_item("cmmi_wasm_app_player_name").unwrap().as_deref(),
        Some("Tab")
    );
    assert_eq!(local.get_item("cmmi_wasm_app_player_name").unwrap(), None);
    assert!(local.get_item("cmmi_wasm_app_players").unwrap().is_some());

    app.suite().identities().sign_out().unwrap();
    app.suite().identities().clear_identities().await.unwrap();
}
