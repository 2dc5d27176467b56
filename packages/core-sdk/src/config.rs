use std::path::PathBuf;

use crate::db::DEFAULT_DB_PATH;
use crate::llm::{GEMINI_DEFAULT_BASE, OPENROUTER_DEFAULT_BASE};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/**
 * \brief Process-wide settings, read once at startup and never mutated afterwards.
 */
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub gemini_api_key: String,
    pub openrouter_api_key: String,
    /** \brief Replaces the built-in persona when set (`SYSTEM_MESSAGE`). */
    pub system_message: Option<String>,
    /** \brief `OPENAI_MODEL`. */
    pub openai_model: Option<String>,
    /** \brief `GEMINI_MODEL`. */
    pub gemini_model: Option<String>,
    pub gemini_api_base: String,
    pub openrouter_api_base: String,
    pub db_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            openrouter_api_key: String::new(),
            system_message: None,
            openai_model: None,
            gemini_model: None,
            gemini_api_base: GEMINI_DEFAULT_BASE.to_string(),
            openrouter_api_base: OPENROUTER_DEFAULT_BASE.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl ChatConfig {
    pub fn gemini_model_for(&self, requested: Option<&str>) -> String {
        requested
            .or(self.gemini_model.as_deref())
            .unwrap_or(DEFAULT_GEMINI_MODEL)
            .to_string()
    }

    pub fn openrouter_model_for(&self, requested: Option<&str>) -> String {
        requested
            .or(self.openai_model.as_deref())
            .unwrap_or(DEFAULT_OPENAI_MODEL)
            .to_string()
    }

    pub fn openrouter_temperature_for(&self, requested: Option<f64>) -> f64 {
        requested.unwrap_or(DEFAULT_TEMPERATURE)
    }
}
