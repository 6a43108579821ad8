use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{
    definition_store::DefinitionStore,
    definitions::Definitions,
    exposure::{EvaluationMode, ExposureTracker},
    http::FlagsHttpClient,
    poller::{refresh_definitions, PollerThread},
    ClientConfig, EvaluationContext, FlagsProvider, Result, SelectedVariant,
};

/// Evaluates flags locally against definitions cached from the server.
///
/// # Polling
///
/// Call [`LocalFlagsProvider::start_polling`] before evaluating flags. Until the first fetch
/// succeeds, every evaluation returns the fallback.
///
/// # Examples
/// ```no_run
/// # use mixpanel_flags::{ClientConfig, EvaluationContext, FlagsProvider};
/// let provider = ClientConfig::from_token("project-token")
///     .to_local_provider()
///     .unwrap();
/// provider.start_polling().unwrap();
///
/// let context = EvaluationContext::with_distinct_id("user-42");
/// if provider.is_enabled("new-checkout", &context) {
///     // ...
/// }
/// ```
pub struct LocalFlagsProvider<'a> {
    definition_store: Arc<DefinitionStore>,
    fetcher: Arc<FlagsHttpClient>,
    exposure_tracker: ExposureTracker<'a>,
    enable_polling: bool,
    polling_interval: Duration,
    poller: Mutex<Option<PollerThread>>,
}

impl<'a> LocalFlagsProvider<'a> {
    /// Create a new `LocalFlagsProvider` using the specified configuration. No request is made
    /// until [`LocalFlagsProvider::start_polling`] is called.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be initialized.
    pub fn new(config: ClientConfig<'a>) -> Result<Self> {
        let fetcher = FlagsHttpClient::new(&config.api_host, &config.token, config.request_timeout)?;
        Ok(LocalFlagsProvider {
            definition_store: Arc::new(DefinitionStore::new()),
            fetcher: Arc::new(fetcher),
            exposure_tracker: ExposureTracker::new(config.event_tracker),
            enable_polling: config.enable_polling,
            polling_interval: config.polling_interval,
            poller: Mutex::new(None),
        })
    }

    /// Create a provider that starts out with `definitions` already installed, e.g. to bootstrap
    /// from a snapshot shipped with the application.
    pub fn with_definitions(config: ClientConfig<'a>, definitions: Definitions) -> Result<Self> {
        let provider = LocalFlagsProvider::new(config)?;
        provider.definition_store.set_definitions(definitions);
        Ok(provider)
    }

    /// Fetch definitions now, blocking until the request completes, then keep refreshing them in
    /// the background if polling is enabled.
    ///
    /// The background poller is started even if the initial fetch fails, so the provider can
    /// recover once the server is reachable. Calling this while a poller is already running only
    /// performs the immediate fetch.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial fetch, or an I/O error if the poller thread could not be
    /// spawned.
    pub fn start_polling(&self) -> Result<()> {
        let result = refresh_definitions(&self.fetcher, &self.definition_store);

        if self.enable_polling {
            let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
            if poller.is_none() {
                log::debug!(target: "mixpanel_flags",
                            interval_secs = self.polling_interval.as_secs();
                            "starting definitions poller");
                *poller = Some(PollerThread::start(
                    self.fetcher.clone(),
                    self.definition_store.clone(),
                    self.polling_interval,
                )?);
            } else {
                log::debug!(target: "mixpanel_flags", "definitions poller already running");
            }
        }

        result
    }

    /// Stop background polling. Does nothing if polling is not running.
    ///
    /// A fetch that is already in flight still completes and its result is installed.
    pub fn stop_polling(&self) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match poller {
            Some(poller) => {
                log::debug!(target: "mixpanel_flags", "stopping definitions poller");
                poller.stop();
            }
            None => {
                log::debug!(target: "mixpanel_flags", "stop_polling called but poller is not running");
            }
        }
    }

    /// `true` once flag definitions have been fetched.
    pub fn are_flags_ready(&self) -> bool {
        self.definition_store.get_definitions().is_some()
    }

    /// Track an exposure for a variant obtained from [`FlagsProvider::get_all_variants`], which
    /// does not track exposures itself.
    pub fn track_exposure_event(
        &self,
        flag_key: &str,
        variant: &SelectedVariant,
        context: &EvaluationContext,
    ) {
        self.exposure_tracker
            .track_exposure(flag_key, variant, context, EvaluationMode::Local, None);
    }

    fn evaluate(&self, flag_key: &str, context: &EvaluationContext) -> Option<SelectedVariant> {
        let Some(definitions) = self.definition_store.get_definitions() else {
            log::warn!(target: "mixpanel_flags", flag_key; "evaluating a flag before flag definitions have been fetched");
            return None;
        };

        let selected = definitions.eval_flag(flag_key, context);

        log::trace!(target: "mixpanel_flags",
                    flag_key,
                    variant_key:serde = selected.as_ref().map(|s| &s.variant_key);
                    "evaluated a flag");

        selected
    }
}

impl FlagsProvider for LocalFlagsProvider<'_> {
    fn get_variant(
        &self,
        flag_key: &str,
        fallback: SelectedVariant,
        context: &EvaluationContext,
        report_exposure: bool,
    ) -> SelectedVariant {
        let Some(selected) = self.evaluate(flag_key, context) else {
            return fallback;
        };

        if report_exposure {
            self.track_exposure_event(flag_key, &selected, context);
        }

        selected
    }

    fn get_all_variants(
        &self,
        context: &EvaluationContext,
    ) -> Option<HashMap<String, SelectedVariant>> {
        let Some(definitions) = self.definition_store.get_definitions() else {
            return Some(HashMap::new());
        };

        Some(
            definitions
                .flag_keys()
                .filter_map(|flag_key| {
                    definitions
                        .eval_flag(flag_key, context)
                        .map(|selected| (flag_key.to_owned(), selected))
                })
                .collect(),
        )
    }
}

impl Drop for LocalFlagsProvider<'_> {
    fn drop(&mut self) {
        if let Some(poller) = self
            .poller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        io::BufReader,
        time::{Duration, Instant},
    };

    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    use super::LocalFlagsProvider;
    use crate::{
        definitions::{Definitions, DefinitionsResponse},
        exposure::tests::recording_tracker,
        ClientConfig, EvaluationContext, FlagsProvider, SelectedVariant,
    };

    fn fixture() -> Definitions {
        let f = File::open("tests/data/definitions.json")
            .expect("Failed to open tests/data/definitions.json");
        let response: DefinitionsResponse = serde_json::from_reader(BufReader::new(f)).unwrap();
        response.into_definitions()
    }

    fn definitions(flags: serde_json::Value) -> Definitions {
        serde_json::from_value::<DefinitionsResponse>(json!({ "flags": flags }))
            .unwrap()
            .into_definitions()
    }

    fn value_flag(key: &str, value: serde_json::Value) -> serde_json::Value {
        json!({
            "key": key,
            "context": "distinct_id",
            "ruleset": {
                "variants": [{ "key": "only", "value": value, "split": 1.0 }],
                "rollout": [{ "rollout_percentage": 100 }],
            }
        })
    }

    fn user(id: &str) -> EvaluationContext {
        EvaluationContext::with_distinct_id(id)
    }

    #[test]
    fn returns_fallback_before_definitions_are_fetched() {
        let provider = ClientConfig::from_token("token").to_local_provider().unwrap();

        assert!(!provider.are_flags_ready());
        let selected =
            provider.get_variant("f1", SelectedVariant::fallback("off"), &user("u1"), true);
        assert_eq!(selected, SelectedVariant::fallback("off"));
        assert_eq!(provider.get_all_variants(&user("u1")), Some(Default::default()));
    }

    #[test]
    fn get_variant_tracks_one_exposure_per_selection() {
        let (recorded, tracker) = recording_tracker();
        let provider = LocalFlagsProvider::with_definitions(
            ClientConfig::from_token("token").event_tracker(tracker),
            fixture(),
        )
        .unwrap();

        let selected = provider.get_variant(
            "checkout-redesign",
            SelectedVariant::fallback("control"),
            &user("u1"),
            true,
        );
        assert!(!selected.is_fallback());
        assert_eq!(recorded.lock().unwrap().len(), 1);

        let value = provider.get_variant_value("checkout-redesign", json!("x"), &user("u2"), true);
        assert_ne!(value, json!("x"));
        assert_eq!(recorded.lock().unwrap().len(), 2);

        let recorded = recorded.lock().unwrap();
        let (event, properties) = &recorded[0];
        assert_eq!(event, "$experiment_started");
        assert_eq!(properties["Experiment name"], json!("checkout-redesign"));
        assert_eq!(properties["Flag evaluation mode"], json!("local"));
    }

    #[test]
    fn fallback_and_opt_out_do_not_track() {
        let (recorded, tracker) = recording_tracker();
        let provider = LocalFlagsProvider::with_definitions(
            ClientConfig::from_token("token").event_tracker(tracker),
            fixture(),
        )
        .unwrap();

        let selected =
            provider.get_variant("unknown", SelectedVariant::fallback(1), &user("u1"), true);
        assert!(selected.is_fallback());

        provider.get_variant(
            "checkout-redesign",
            SelectedVariant::fallback("control"),
            &user("u1"),
            false,
        );

        assert!(recorded.lock().unwrap().is_empty());
    }

    #[test]
    fn fixture_flag_is_stable_and_splits_users() {
        let provider =
            LocalFlagsProvider::with_definitions(ClientConfig::from_token("token"), fixture())
                .unwrap();

        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            let context = user(&format!("user-{i}"));
            let first = provider.get_variant_value("checkout-redesign", json!(null), &context, false);
            let second = provider.get_variant_value("checkout-redesign", json!(null), &context, false);
            assert_eq!(first, second);
            seen.insert(first.to_string());
        }
        assert_eq!(seen.len(), 2, "{seen:?}");
    }

    #[test]
    fn fixture_runtime_rule_requires_premium_plan() {
        let provider =
            LocalFlagsProvider::with_definitions(ClientConfig::from_token("token"), fixture())
                .unwrap();

        let fallback = json!("fallback");
        let basic = user("u1").custom_property("plan", "basic");
        let premium = user("u1").custom_property("plan", "Premium");

        assert_eq!(
            provider.get_variant_value("premium-dashboard", fallback.clone(), &user("u1"), false),
            fallback
        );
        assert_eq!(
            provider.get_variant_value("premium-dashboard", fallback.clone(), &basic, false),
            fallback
        );
        assert_eq!(
            provider.get_variant_value("premium-dashboard", fallback, &premium, false),
            json!(true)
        );
    }

    #[test]
    fn fixture_qa_tester_override() {
        let provider =
            LocalFlagsProvider::with_definitions(ClientConfig::from_token("token"), fixture())
                .unwrap();

        let selected = provider.get_variant(
            "premium-dashboard",
            SelectedVariant::fallback(false),
            &user("qa-tester-1"),
            false,
        );
        assert_eq!(selected.variant_key.as_deref(), Some("off"));
        assert_eq!(selected.is_qa_tester, Some(true));
    }

    #[test]
    fn is_enabled_requires_boolean_true() {
        let provider = LocalFlagsProvider::with_definitions(
            ClientConfig::from_token("token"),
            definitions(json!([
                value_flag("bool-true", json!(true)),
                value_flag("bool-false", json!(false)),
                value_flag("string-true", json!("true")),
                value_flag("number-one", json!(1)),
            ])),
        )
        .unwrap();

        assert!(provider.is_enabled("bool-true", &user("u1")));
        assert!(!provider.is_enabled("bool-false", &user("u1")));
        assert!(!provider.is_enabled("string-true", &user("u1")));
        assert!(!provider.is_enabled("number-one", &user("u1")));
        assert!(!provider.is_enabled("missing", &user("u1")));
    }

    #[test]
    fn get_all_variants_does_not_track() {
        let (recorded, tracker) = recording_tracker();
        let provider = LocalFlagsProvider::with_definitions(
            ClientConfig::from_token("token").event_tracker(tracker),
            definitions(json!([
                value_flag("a", json!(1)),
                value_flag("b", json!(2)),
                {
                    "key": "never",
                    "context": "distinct_id",
                    "ruleset": {
                        "variants": [{ "key": "x", "value": 3, "split": 1.0 }],
                        "rollout": [{ "rollout_percentage": 0 }],
                    }
                },
            ])),
        )
        .unwrap();

        let all = provider.get_all_variants(&user("u1")).unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].variant_value, json!(1));
        assert_eq!(all["b"].variant_value, json!(2));
        assert!(recorded.lock().unwrap().is_empty());

        provider.track_exposure_event("a", &all["a"], &user("u1"));
        assert_eq!(recorded.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_distinct_id_skips_exposure_only() {
        let (recorded, tracker) = recording_tracker();
        let mut flag = value_flag("company-flag", json!("on"));
        flag["context"] = json!("company_id");
        let provider = LocalFlagsProvider::with_definitions(
            ClientConfig::from_token("token").event_tracker(tracker),
            definitions(json!([flag])),
        )
        .unwrap();

        let context = EvaluationContext::new().attribute("company_id", "acme");
        let value = provider.get_variant_value("company-flag", json!("off"), &context, true);

        assert_eq!(value, json!("on"));
        assert!(recorded.lock().unwrap().is_empty());
    }

    #[test]
    fn start_polling_fetches_once_without_polling() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200)
                .json_body(json!({ "flags": [value_flag("f1", json!(true))] }));
        });

        let provider = ClientConfig::from_token("token")
            .api_host(server.base_url())
            .enable_polling(false)
            .to_local_provider()
            .unwrap();

        provider.start_polling().unwrap();

        mock.assert_hits(1);
        assert!(provider.are_flags_ready());
        assert!(provider.is_enabled("f1", &user("u1")));

        // Not running; stopping is a no-op.
        provider.stop_polling();
    }

    #[test]
    fn failed_poll_keeps_cached_definitions() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200)
                .json_body(json!({ "flags": [value_flag("f1", json!(true))] }));
        });

        let provider = ClientConfig::from_token("token")
            .api_host(server.base_url())
            .enable_polling(false)
            .to_local_provider()
            .unwrap();
        provider.start_polling().unwrap();

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200).body("{ truncated");
        });

        assert!(provider.start_polling().is_err());
        assert!(provider.is_enabled("f1", &user("u1")));
    }

    #[test]
    fn failed_initial_fetch_returns_error_and_fallbacks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(401).body("invalid token");
        });

        let provider = ClientConfig::from_token("token")
            .api_host(server.base_url())
            .enable_polling(false)
            .to_local_provider()
            .unwrap();

        assert!(provider.start_polling().is_err());
        assert!(!provider.are_flags_ready());
        assert!(!provider.is_enabled("f1", &user("u1")));
    }

    #[test]
    fn background_polling_stops_on_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200).json_body(json!({ "flags": [] }));
        });

        let provider = ClientConfig::from_token("token")
            .api_host(server.base_url())
            .polling_interval(Duration::from_millis(10))
            .to_local_provider()
            .unwrap();
        provider.start_polling().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while mock.hits() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(mock.hits() >= 3);

        provider.stop_polling();
        provider.stop_polling();

        // Allow an in-flight fetch to land.
        std::thread::sleep(Duration::from_millis(100));
        let hits = mock.hits();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(mock.hits(), hits);
    }

    #[test]
    fn stop_during_inflight_fetch_still_installs() {
        let server = MockServer::start();
        let mut initial = server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200).json_body(json!({ "flags": [] }));
        });

        let provider = ClientConfig::from_token("token")
            .api_host(server.base_url())
            .polling_interval(Duration::from_millis(200))
            .to_local_provider()
            .unwrap();
        provider.start_polling().unwrap();

        initial.delete();
        let slow = server.mock(|when, then| {
            when.method(GET).path("/flags/definitions");
            then.status(200)
                .delay(Duration::from_millis(400))
                .json_body(json!({ "flags": [value_flag("late", json!(true))] }));
        });

        // The poller fetches at ~200ms and gets its answer at ~600ms.
        std::thread::sleep(Duration::from_millis(350));
        provider.stop_polling();
        assert!(!provider.is_enabled("late", &user("u1")));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !provider.is_enabled("late", &user("u1")) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(provider.is_enabled("late", &user("u1")));
        slow.assert_hits(1);
    }
}
