use std::{collections::HashMap, time::Instant};

use crate::{
    exposure::{EvaluationMode, ExposureTracker},
    http::FlagsHttpClient,
    ClientConfig, EvaluationContext, FlagsProvider, Result, SelectedVariant,
};

/// Asks the server to evaluate flags on every call.
///
/// Every call performs one blocking request. Request failures are logged and the fallback is
/// returned.
///
/// # Examples
/// ```no_run
/// # use mixpanel_flags::{ClientConfig, EvaluationContext, FlagsProvider};
/// let provider = ClientConfig::from_token("project-token")
///     .to_remote_provider()
///     .unwrap();
///
/// let context = EvaluationContext::with_distinct_id("user-42");
/// let color = provider.get_variant_value("button-color", "blue".into(), &context, true);
/// ```
pub struct RemoteFlagsProvider<'a> {
    fetcher: FlagsHttpClient,
    exposure_tracker: ExposureTracker<'a>,
}

impl<'a> RemoteFlagsProvider<'a> {
    /// Create a new `RemoteFlagsProvider` using the specified configuration. Polling options are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be initialized.
    pub fn new(config: ClientConfig<'a>) -> Result<Self> {
        let fetcher = FlagsHttpClient::new(&config.api_host, &config.token, config.request_timeout)?;
        Ok(RemoteFlagsProvider {
            fetcher,
            exposure_tracker: ExposureTracker::new(config.event_tracker),
        })
    }
}

impl FlagsProvider for RemoteFlagsProvider<'_> {
    fn get_variant(
        &self,
        flag_key: &str,
        fallback: SelectedVariant,
        context: &EvaluationContext,
        report_exposure: bool,
    ) -> SelectedVariant {
        let start = Instant::now();
        let flags = match self.fetcher.fetch_remote_flags(context, Some(flag_key)) {
            Ok(flags) => flags,
            Err(err) => {
                log::warn!(target: "mixpanel_flags",
                           flag_key;
                           "remote flag evaluation failed, returning fallback: {}", err);
                return fallback;
            }
        };
        let latency = start.elapsed();

        let Some(selected) = flags.get(flag_key).cloned() else {
            log::debug!(target: "mixpanel_flags", flag_key; "flag not returned by remote evaluation");
            return fallback;
        };
        if selected.is_fallback() {
            log::warn!(target: "mixpanel_flags",
                       flag_key;
                       "remote evaluation returned a variant without a key, returning fallback");
            return fallback;
        }

        if report_exposure {
            self.exposure_tracker.track_exposure(
                flag_key,
                &selected,
                context,
                EvaluationMode::Remote,
                Some(latency),
            );
        }

        selected
    }

    fn get_all_variants(
        &self,
        context: &EvaluationContext,
    ) -> Option<HashMap<String, SelectedVariant>> {
        self.fetcher
            .fetch_remote_flags(context, None)
            .inspect_err(|err| {
                log::warn!(target: "mixpanel_flags", "remote flag evaluation failed: {}", err);
            })
            .ok()
    }
}
