//! HTTP plumbing shared by the definitions poller and the remote provider.
use std::{collections::HashMap, time::Duration};

use rand::{thread_rng, Rng};
use reqwest::{StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    context::EvaluationContext,
    definitions::{Definitions, DefinitionsResponse},
    variant::SelectedVariant,
    Error, Result,
};

/// Value of the `mp_lib` query parameter.
pub(crate) const SDK_NAME: &str = "rust";

const DEFINITIONS_ENDPOINT: &str = "/flags/definitions";
const FLAGS_ENDPOINT: &str = "/flags";

/// Response body of `GET /flags`.
#[derive(Debug, Deserialize)]
struct RemoteFlagsResponse {
    flags: HashMap<String, SelectedVariant>,
}

/// A client for the flags API. Reuse one instance so connections are pooled.
pub(crate) struct FlagsHttpClient {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl FlagsHttpClient {
    pub fn new(api_host: &str, token: &str, request_timeout: Duration) -> Result<FlagsHttpClient> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(FlagsHttpClient {
            client,
            base_url: base_url(api_host),
            token: token.to_owned(),
        })
    }

    /// Fetch the full set of flag definitions for the project.
    pub fn fetch_definitions(&self) -> Result<Definitions> {
        let url = self.url(DEFINITIONS_ENDPOINT, &[])?;

        log::debug!(target: "mixpanel_flags", "fetching flag definitions");
        let response: DefinitionsResponse = self.get_json(self.client.get(url))?;
        let definitions = response.into_definitions();
        log::debug!(target: "mixpanel_flags",
                    flag_count = definitions.len();
                    "successfully fetched flag definitions");

        Ok(definitions)
    }

    /// Ask the server to evaluate flags for `context`. If `flag_key` is set, only that flag is
    /// requested.
    pub fn fetch_remote_flags(
        &self,
        context: &EvaluationContext,
        flag_key: Option<&str>,
    ) -> Result<HashMap<String, SelectedVariant>> {
        let context = serde_json::to_string(context)?;
        let mut params = vec![("context", context.as_str())];
        if let Some(flag_key) = flag_key {
            params.push(("flag_key", flag_key));
        }
        let url = self.url(FLAGS_ENDPOINT, &params)?;

        log::debug!(target: "mixpanel_flags", flag_key:serde = flag_key; "requesting remote evaluation");
        let request = self.client.get(url).header("traceparent", traceparent());
        let response: RemoteFlagsResponse = self.get_json(request)?;

        Ok(response.flags)
    }

    fn url(&self, endpoint: &str, extra_params: &[(&str, &str)]) -> Result<Url> {
        let params = [
            ("mp_lib", SDK_NAME),
            ("$lib_version", env!("CARGO_PKG_VERSION")),
            ("token", &*self.token),
        ];
        Url::parse_with_params(
            &format!("{}{}", self.base_url, endpoint),
            params.iter().chain(extra_params),
        )
        .map_err(Error::InvalidBaseUrl)
    }

    fn get_json<T: DeserializeOwned>(&self, request: reqwest::blocking::RequestBuilder) -> Result<T> {
        let response = request.basic_auth(&self.token, None::<&str>).send()?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(Error::UnexpectedStatus { status, body });
        }

        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// `api_host` may be given with or without a scheme; HTTPS is assumed when it is missing.
fn base_url(api_host: &str) -> String {
    let api_host = api_host.trim_end_matches('/');
    if api_host.starts_with("http://") || api_host.starts_with("https://") {
        api_host.to_owned()
    } else {
        format!("https://{api_host}")
    }
}

/// A W3C trace-context header value with random trace and parent ids.
pub(crate) fn traceparent() -> String {
    let mut rng = thread_rng();
    let trace_id: u128 = rng.gen();
    let parent_id: u64 = rng.gen();
    format!("00-{trace_id:032x}-{parent_id:016x}-01")
}
