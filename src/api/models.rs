use crate::api::ModelsResponse;
use crate::core::error::TransportError;
use crate::core::endpoint::{endpoint_url, MODELS};

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<ModelsResponse, TransportError> {
    let models_url = endpoint_url(base_url, MODELS);
    let response = client
        .get(models_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {api_key}"))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(TransportError::Status {
            status,
            message: crate::core::chat_stream::format_api_error(&error_text),
        });
    }

    Ok(response.json::<ModelsResponse>().await?)
}

/// Picks the model a profile without an explicit `model` should talk to:
/// the first id the endpoint advertises.
pub async fn first_model_id(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<Option<String>, TransportError> {
    let models = fetch_models(client, base_url, api_key).await?;
    Ok(models.data.into_iter().next().map(|model| model.id))
}

#[cfg(test)]
mod tests {
    use crate::api::ModelsResponse;

    #[test]
    fn models_response_keeps_advertised_order() {
        let payload = r#"{"object":"list","data":[{"id":"qwen3","owned_by":"me"},{"id":"llama"}]}"#;
        let models: ModelsResponse = serde_json::from_str(payload).expect("parse");
        let ids: Vec<_> = models.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["qwen3", "llama"]);
        assert_eq!(models.data[0].owned_by.as_deref(), Some("me"));
    }
}
