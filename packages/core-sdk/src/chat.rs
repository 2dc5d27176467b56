use time::Date;

use crate::config::ChatConfig;
use crate::error::LlmError;
use crate::llm::ProviderCall;
use crate::models::{ChatRequest, SessionUser};
use crate::persist;
use crate::prompt;
use crate::relay::{self, RelayStream};
use crate::server::AppState;

/**
 * \brief Which upstream a chat request is sent to.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRoute {
    Google,
    OpenRouter,
}

impl ProviderRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRoute::Google => "google",
            ProviderRoute::OpenRouter => "openrouter",
        }
    }
}

/**
 * \brief Builds the per-call provider input: system prompt, model, temperature and key.
 * \details A non-empty preview token replaces the configured key for this call only.
 */
pub fn prepare_call(
    config: &ChatConfig,
    route: ProviderRoute,
    request: &ChatRequest,
    user: &SessionUser,
    date: Date,
) -> ProviderCall {
    let mut messages = request.messages.clone();
    prompt::ensure_system_message(
        &mut messages,
        user.name.as_deref(),
        config.system_message.as_deref(),
        date,
    );

    let default_key = match route {
        ProviderRoute::Google => &config.gemini_api_key,
        ProviderRoute::OpenRouter => &config.openrouter_api_key,
    };
    let api_key = request
        .preview_token()
        .unwrap_or(default_key.as_str())
        .to_string();

    match route {
        ProviderRoute::Google => ProviderCall {
            api_key,
            model: config.gemini_model_for(request.requested_model()),
            temperature: None,
            messages,
        },
        ProviderRoute::OpenRouter => ProviderCall {
            api_key,
            model: config.openrouter_model_for(request.requested_model()),
            temperature: Some(config.openrouter_temperature_for(request.requested_temperature())),
            messages,
        },
    }
}

/**
 * \brief Calls the provider and returns the body stream; the transcript is saved when it completes.
 */
pub async fn start_chat(
    state: &AppState,
    route: ProviderRoute,
    request: ChatRequest,
    user: SessionUser,
) -> Result<RelayStream, LlmError> {
    let call = prepare_call(&state.config, route, &request, &user, prompt::today());
    let provider = state.provider(route);

    tracing::info!(
        route = route.as_str(),
        provider = provider.name(),
        model = %call.model,
        user_id = %user.id,
        messages = call.messages.len(),
        preview_token = request.preview_token().is_some(),
        "starting chat stream"
    );

    let tokens = provider.stream_chat(&call).await?;

    let store = state.store.clone();
    let chat_id = request.id;
    let messages = call.messages;
    Ok(relay::relay_with_completion(tokens, move |completion| async move {
        persist::persist_completion(store.as_ref(), chat_id, &user.id, &messages, completion).await
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatSettings, Message, Role};
    use time::macros::date;

    fn user() -> SessionUser {
        SessionUser {
            id: "u1".into(),
            name: Some("Ada".into()),
        }
    }

    fn request(preview_token: Option<&str>, settings: Option<ChatSettings>) -> ChatRequest {
        ChatRequest {
            id: None,
            chat_settings: settings,
            messages: vec![Message::user("Hello")],
            preview_token: preview_token.map(str::to_string),
        }
    }

    fn config() -> ChatConfig {
        ChatConfig {
            gemini_api_key: "env-gemini".into(),
            openrouter_api_key: "env-openrouter".into(),
            ..ChatConfig::default()
        }
    }

    #[test]
    fn test_default_key_and_system_prompt() {
        let call = prepare_call(
            &config(),
            ProviderRoute::Google,
            &request(None, None),
            &user(),
            date!(2024 - 05 - 01),
        );
        assert_eq!(call.api_key, "env-gemini");
        assert_eq!(call.model, "gemini-pro");
        assert_eq!(call.temperature, None);
        assert_eq!(call.messages.len(), 2);
        assert_eq!(call.messages[0].role, Role::System);
        assert!(call.messages[0].content.contains("2024-05-01"));
    }

    #[test]
    fn test_preview_token_overrides_key_without_touching_config() {
        let config = config();
        let call = prepare_call(
            &config,
            ProviderRoute::OpenRouter,
            &request(Some("preview-key"), None),
            &user(),
            date!(2024 - 05 - 01),
        );
        assert_eq!(call.api_key, "preview-key");
        assert_eq!(config.openrouter_api_key, "env-openrouter");

        let next = prepare_call(
            &config,
            ProviderRoute::OpenRouter,
            &request(None, None),
            &user(),
            date!(2024 - 05 - 01),
        );
        assert_eq!(next.api_key, "env-openrouter");
    }

    #[test]
    fn test_openrouter_settings_and_defaults() {
        let call = prepare_call(
            &config(),
            ProviderRoute::OpenRouter,
            &request(None, None),
            &user(),
            date!(2024 - 05 - 01),
        );
        assert_eq!(call.model, "gpt-3.5-turbo");
        assert_eq!(call.temperature, Some(0.7));

        let settings = ChatSettings {
            model: Some("mistralai/mistral-7b-instruct".into()),
            temperature: Some(0.1),
        };
        let call = prepare_call(
            &config(),
            ProviderRoute::OpenRouter,
            &request(None, Some(settings)),
            &user(),
            date!(2024 - 05 - 01),
        );
        assert_eq!(call.model, "mistralai/mistral-7b-instruct");
        assert_eq!(call.temperature, Some(0.1));
    }
}
