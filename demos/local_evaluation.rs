use mixpanel_flags::{EvaluationContext, FlagsProvider, Properties, TrackResult};

pub fn main() -> mixpanel_flags::Result<()> {
    // Configure env_logger to see SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("mixpanel_flags"))
        .init();

    let token = std::env::var("MIXPANEL_TOKEN")
        .expect("MIXPANEL_TOKEN env variable should contain project token");
    let provider = mixpanel_flags::ClientConfig::from_token(token)
        .event_tracker(|event: &str, properties: &Properties| -> TrackResult {
            println!("Tracking {event}: {properties:?}");
            Ok(())
        })
        .to_local_provider()?;

    // Fetch definitions and keep refreshing them in the background. Until the first fetch
    // succeeds, every flag resolves to its fallback.
    if let Err(err) = provider.start_polling() {
        println!("error fetching flag definitions: {:?}", err);
    }

    let context = EvaluationContext::with_distinct_id("test-user").custom_property("plan", "premium");

    let enabled = provider.is_enabled("a-boolean-flag", &context);
    println!("Enabled: {:?}", enabled);

    let all = provider.get_all_variants(&context).unwrap_or_default();
    for (flag_key, variant) in &all {
        println!("{flag_key}: {:?}", variant.variant_value);
    }

    provider.stop_polling();

    Ok(())
}
