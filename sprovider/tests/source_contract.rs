use futures_util::StreamExt;
use sprovider::prelude::*;

async fn drain(source: &dyn FragmentSource) -> Result<String, ProviderError> {
    let mut stream = source.stream("model", "prompt").await?;
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

#[tokio::test]
async fn factory_built_scripted_source_streams_through_trait_object() {
    let source = create_fragment_source(&ProviderConfig::scripted(["Hel", "lo"]))
        .expect("scripted source");

    assert_eq!(drain(source.as_ref()).await, Ok("Hello".to_string()));
    assert_eq!(drain(source.as_ref()).await, Ok("Hello".to_string()));
}

#[tokio::test]
async fn open_failure_reports_retryability_through_trait_object() {
    let source = ScriptedFragmentSource::new(["ok"])
        .with_open_failure(ProviderError::rate_limited("slow down"))
        .with_open_failure(ProviderError::authentication("bad key"));

    let first = drain(&source).await.expect_err("rate limited");
    assert!(first.retryable);
    let second = drain(&source).await.expect_err("auth");
    assert!(!second.retryable);
    assert_eq!(drain(&source).await, Ok("ok".to_string()));
}

#[test]
fn provider_config_debug_hides_api_key() {
    let config = ProviderConfig::openai_compatible("sk-very-secret");
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("sk-very-secret"));
    assert!(rendered.contains("[REDACTED]"));
}
