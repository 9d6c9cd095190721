//! Startup wiring for the browser build.
//!
//! Builds one [`Suite`] over `localStorage`, keeps the active player in the
//! tab's `sessionStorage`, starts the cross-tab poll loop and exposes a small
//! JSON API for the rendering layer.
use cmmi_game::{
    AdminError, ConfigError, DocumentBackend, IdentityError, KeyValueStorage, LeaderboardView,
    Persistence, ScoreRecord, StorageError, Subscription, Suite, SuiteConfig,
};
use std::cell::RefCell;
use std::rc::Rc;

use crate::poller::{self, PollHandle};
use crate::storage::BrowserStorage;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("suite not started")]
    NotStarted,
}

/// A running suite plus the timer that keeps it in sync with other tabs.
pub struct WebApp {
    suite: Suite,
    _poller: PollHandle,
}

impl WebApp {
    /// Start over `localStorage` and `sessionStorage`, with `backend` as the
    /// durable store if the configuration enables it.
    ///
    /// # Errors
    ///
    /// Returns an error if either storage area is unavailable.
    pub fn start(
        config: SuiteConfig,
        backend: Option<Rc<dyn DocumentBackend>>,
    ) -> Result<Self, WebError> {
        let shared: Rc<dyn KeyValueStorage> = Rc::new(BrowserStorage::local()?);
        let tab: Rc<dyn KeyValueStorage> = Rc::new(BrowserStorage::session()?);
        let mut builder = Persistence::builder(shared)
            .config(&config)
            .session_storage(tab);
        if let Some(backend) = backend {
            builder = builder.durable(backend);
        }
        let persistence = builder.build();
        log::info!(
            "suite started (durable backend: {}, poll every {} ms)",
            persistence.has_durable(),
            config.poll_interval_ms
        );
        let interval = config.poll_interval();
        let suite = Suite::new(config, persistence);
        let poller = poller::start(suite.scores().clone(), interval);
        Ok(Self {
            suite,
            _poller: poller,
        })
    }

    #[must_use]
    pub const fn suite(&self) -> &Suite {
        &self.suite
    }
}

/// Leaderboard boards and overall ranking as JSON.
///
/// # Errors
///
/// Returns an error if the view cannot be encoded.
pub async fn leaderboard_json(suite: &Suite) -> Result<String, WebError> {
    let scores = suite.scores().list().await;
    let view = LeaderboardView::compute(&scores, suite.config().leaderboard_size);
    Ok(serde_json::to_string(&view)?)
}

/// Progress tracker for `player` (or the active player) as JSON.
///
/// # Errors
///
/// Returns an error if the report cannot be encoded.
pub async fn progress_json(suite: &Suite, player: Option<&str>) -> Result<String, WebError> {
    let name = player.map_or_else(|| suite.identities().current_name(), str::to_string);
    let report = suite.progress_report(&name).await;
    Ok(serde_json::to_string(&report)?)
}

/// Deliver every score snapshot to `on_change` as a JSON array, starting with
/// the current one.
pub async fn subscribe_json<F>(suite: &Suite, on_change: F) -> Subscription
where
    F: Fn(&str) + 'static,
{
    suite
        .scores()
        .subscribe(move |scores: &[ScoreRecord]| match serde_json::to_string(scores) {
            Ok(json) => on_change(&json),
            Err(err) => log::error!("encoding score snapshot failed: {err}"),
        })
        .await
}

/// Delete every score after checking the admin secret. Returns how many
/// records were removed.
///
/// # Errors
///
/// Returns [`AdminError::WrongSecret`] if `secret` does not match.
pub async fn clear_scores(suite: &Suite, secret: &str) -> Result<usize, WebError> {
    let mut admin = suite.admin_console();
    admin.authenticate(secret)?;
    let removed = admin.load().await?.scores.len();
    admin.clear_scores().await?;
    admin.sign_out();
    log::info!("admin cleared {removed} scores");
    Ok(removed)
}

thread_local! {
    static APP: RefCell<Option<Rc<WebApp>>> = const { RefCell::new(None) };
}

/// Start the page's suite and keep it for the exported bindings.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or storage is unavailable.
pub fn install(config_json: Option<&str>) -> Result<(), WebError> {
    let config = match config_json {
        Some(json) => SuiteConfig::from_json(json)?,
        None => SuiteConfig::default(),
    };
    let app = WebApp::start(config, None)?;
    APP.with(|slot| *slot.borrow_mut() = Some(Rc::new(app)));
    Ok(())
}

/// The installed app, if [`install`] has run.
///
/// # Errors
///
/// Returns [`WebError::NotStarted`] before installation.
pub fn current() -> Result<Rc<WebApp>, WebError> {
    APP.with(|slot| slot.borrow().clone())
        .ok_or(WebError::NotStarted)
}

#[cfg(target_arch = "wasm32")]
mod bindings {
    use super::{WebError, current};
    use cmmi_game::Subscription;
    use wasm_bindgen::prelude::*;

    use crate::dom;

    fn to_js(err: impl Into<WebError>) -> JsValue {
        JsValue::from_str(&err.into().to_string())
    }

    /// Handle returned by `subscribeScores`; call `unsubscribe` to stop.
    #[wasm_bindgen]
    pub struct ScoreSubscription {
        inner: Option<Subscription>,
    }

    #[wasm_bindgen]
    impl ScoreSubscription {
        pub fn unsubscribe(&mut self) {
            if let Some(subscription) = self.inner.take() {
                subscription.unsubscribe();
            }
        }

        #[wasm_bindgen(getter, js_name = isActive)]
        pub fn is_active(&self) -> bool {
            self.inner.is_some()
        }
    }

    #[wasm_bindgen(js_name = registerPlayer)]
    pub async fn register_player(name: String) -> Result<String, JsValue> {
        let app = current().map_err(to_js)?;
        let identity = app
            .suite()
            .identities()
            .register(&name)
            .await
            .map_err(to_js)?;
        Ok(identity.player_name)
    }

    #[wasm_bindgen(js_name = nameExists)]
    pub async fn name_exists(name: String) -> Result<bool, JsValue> {
        let app = current().map_err(to_js)?;
        app.suite()
            .identities()
            .name_exists(&name)
            .await
            .map_err(to_js)
    }

    #[wasm_bindgen(js_name = currentName)]
    pub fn current_name() -> Result<String, JsValue> {
        let app = current().map_err(to_js)?;
        Ok(app.suite().identities().current_name())
    }

    #[wasm_bindgen(js_name = recordScore)]
    pub async fn record_score(
        game: String,
        score: u32,
        max_score: u32,
        time_spent: u32,
    ) -> Result<u32, JsValue> {
        let app = current().map_err(to_js)?;
        let record = app
            .suite()
            .record_for_current_player(&game, score, max_score, time_spent)
            .await
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(record.percentage)
    }

    #[wasm_bindgen(js_name = isLocked)]
    pub async fn is_locked(game: String) -> Result<bool, JsValue> {
        let app = current().map_err(to_js)?;
        Ok(app.suite().is_locked(&game, None).await)
    }

    /// Call `callback` with the score list as a JSON string now and on every
    /// change, including writes from other tabs picked up by the poll loop.
    #[wasm_bindgen(js_name = subscribeScores)]
    pub async fn subscribe_scores(callback: js_sys::Function) -> Result<ScoreSubscription, JsValue> {
        let app = current().map_err(to_js)?;
        let subscription = super::subscribe_json(app.suite(), move |json| {
            if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(json)) {
                log::warn!("score subscriber threw: {}", dom::js_error_message(&err));
            }
        })
        .await;
        Ok(ScoreSubscription {
            inner: Some(subscription),
        })
    }

    #[wasm_bindgen(js_name = clearScores)]
    pub async fn clear_scores(secret: String) -> Result<usize, JsValue> {
        let app = current().map_err(to_js)?;
        super::clear_scores(app.suite(), &secret)
            .await
            .map_err(to_js)
    }

    #[wasm_bindgen(js_name = leaderboardJson)]
    pub async fn leaderboard_json() -> Result<String, JsValue> {
        let app = current().map_err(to_js)?;
        super::leaderboard_json(app.suite()).await.map_err(to_js)
    }

    #[wasm_bindgen(js_name = progressJson)]
    pub async fn progress_json(player: Option<String>) -> Result<String, JsValue> {
        let app = current().map_err(to_js)?;
        super::progress_json(app.suite(), player.as_deref())
            .await
            .map_err(to_js)
    }
}
