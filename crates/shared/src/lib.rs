pub mod chat;
pub mod events;
pub mod tool;

pub mod settings {
    use anyhow::{anyhow, Context, Result};
    use serde::{Deserialize, Serialize};
    use std::env;
    use std::fs;
    use std::path::Path;

    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that provides well-researched responses with clickable citations. Follow these citation guidelines:

1. Each citation must be linked to its source using markdown link syntax: [[number]](link)
2. Provide citations line-by-line for easy verification
3. Number your citations sequentially throughout the response
4. When citing multiple sources for one claim, include all relevant numbered links
5. Include full URLs for all citations to make them clickable

Remember to:
- Keep your links accessible and relevant
- Maintain a clear numbering system
- Ensure each significant claim has at least one citation
- Make complex topics understandable while preserving academic rigor
- Update old or broken links when possible";

    /// Credentials for one outbound service.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
        /// Environment variable consulted when `api_key` is unset
        pub env_var: String,
    }

    impl ProviderAuth {
        pub fn from_env(env_var: impl Into<String>) -> Self {
            Self {
                api_key: None,
                env_var: env_var.into(),
            }
        }

        /// Explicit key first, then the environment.
        pub fn resolve(&self) -> Result<String> {
            if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
                return Ok(key.clone());
            }
            env::var(&self.env_var)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| anyhow!("{} not set", self.env_var))
        }
    }

    /// An OpenAI-compatible completion endpoint.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EndpointSettings {
        pub base_url: String, // e.g. "https://api.x.ai/v1"
        pub model: String,
        pub auth: ProviderAuth,
    }

    /// Sampling parameters forwarded with every chat completion request.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatParameters {
        pub temperature: f32,
        pub max_tokens: u32,
        pub top_p: f32,
        pub frequency_penalty: f32,
        pub presence_penalty: f32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ServiceSettings {
        pub base_url: String,
        pub auth: ProviderAuth,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TranscriptSettings {
        pub base_url: String,
        pub auth: ProviderAuth,
        pub language: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RateLimitSettings {
        #[serde(default)]
        pub enabled: bool,
        pub check_url: String,
    }

    /// How many provider results each tool keeps.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct ScanLimits {
        pub pages: usize,
        pub social_posts: usize,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        pub chat: EndpointSettings,
        pub tool_choice: EndpointSettings,
        pub vision: EndpointSettings,
        pub parameters: ChatParameters,
        pub system_prompt: String,
        pub search: ServiceSettings,
        pub image: ServiceSettings,
        pub transcript: TranscriptSettings,
        pub rate_limit: RateLimitSettings,
        pub scan: ScanLimits,
        pub youtube_oembed_url: String,
    }

    impl Default for ChatParameters {
        fn default() -> Self {
            Self {
                temperature: 0.7,
                max_tokens: 2000,
                top_p: 0.9,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
            }
        }
    }

    impl Default for ScanLimits {
        fn default() -> Self {
            Self {
                pages: 10,
                social_posts: 10,
            }
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                chat: EndpointSettings {
                    base_url: "https://api.x.ai/v1".into(),
                    model: "grok-beta".into(),
                    auth: ProviderAuth::from_env("XAI_API_KEY"),
                },
                tool_choice: EndpointSettings {
                    base_url: "https://api.groq.com/openai/v1".into(),
                    model: "llama-3.2-90b-vision-preview".into(),
                    auth: ProviderAuth::from_env("GROQ_API_KEY"),
                },
                vision: EndpointSettings {
                    base_url: "https://api.groq.com/openai/v1".into(),
                    model: "llama-3.2-11b-vision-preview".into(),
                    auth: ProviderAuth::from_env("GROQ_API_KEY"),
                },
                parameters: ChatParameters::default(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
                search: ServiceSettings {
                    base_url: "https://google.serper.dev".into(),
                    auth: ProviderAuth::from_env("SERPER_API_KEY"),
                },
                image: ServiceSettings {
                    base_url: "https://fal.run".into(),
                    auth: ProviderAuth::from_env("FAL_KEY"),
                },
                transcript: TranscriptSettings {
                    base_url: "https://www.searchapi.io/api/v1/search".into(),
                    auth: ProviderAuth::from_env("SEARCH_API_KEY"),
                    language: "en".into(),
                },
                // Off by default: the check URL belongs to a hosted deployment.
                rate_limit: RateLimitSettings {
                    enabled: false,
                    check_url: "http://localhost:3000/api/rate-limit".into(),
                },
                scan: ScanLimits::default(),
                youtube_oembed_url: "https://www.youtube.com/oembed".into(),
            }
        }
    }

    impl AppSettings {
        /// Read settings from a JSON file.
        pub fn load(path: &Path) -> Result<Self> {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            let settings: AppSettings = serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
            settings.validate()?;
            Ok(settings)
        }

        /// Load from `path` when it exists, defaults otherwise.
        pub fn load_or_default(path: &Path) -> Result<Self> {
            if path.exists() {
                Self::load(path)
            } else {
                tracing::info!(path = %path.display(), "No settings file; using defaults");
                Ok(Self::default())
            }
        }

        pub fn save(&self, path: &Path) -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(self)?;
            fs::write(path, json)?;
            Ok(())
        }

        pub fn validate(&self) -> Result<()> {
            for (name, endpoint) in [
                ("chat", &self.chat),
                ("tool_choice", &self.tool_choice),
                ("vision", &self.vision),
            ] {
                if endpoint.model.trim().is_empty() {
                    return Err(anyhow!("{} model is required", name));
                }
                if endpoint.base_url.trim().is_empty() {
                    return Err(anyhow!("{} base_url is required", name));
                }
            }

            if self.scan.pages == 0 || self.scan.social_posts == 0 {
                return Err(anyhow!("Scan limits must be at least 1"));
            }

            if !(0.0..=2.0).contains(&self.parameters.temperature) {
                return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
            }

            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults_validate() {
            let settings = AppSettings::default();
            assert!(settings.validate().is_ok());
            assert_eq!(settings.scan.pages, 10);
            assert_eq!(settings.scan.social_posts, 10);
            assert!(!settings.rate_limit.enabled);
        }

        #[test]
        fn test_validate_rejects_bad_temperature() {
            let mut settings = AppSettings::default();
            settings.parameters.temperature = 3.5;
            assert!(settings.validate().is_err());
        }

        #[test]
        fn test_validate_rejects_zero_scan_limit() {
            let mut settings = AppSettings::default();
            settings.scan.social_posts = 0;
            assert!(settings.validate().is_err());
        }

        #[test]
        fn test_save_and_load() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("settings.json");

            let mut settings = AppSettings::default();
            settings.chat.model = "grok-2".into();
            settings.scan.pages = 5;
            settings.save(&path).unwrap();

            let loaded = AppSettings::load(&path).unwrap();
            assert_eq!(loaded.chat.model, "grok-2");
            assert_eq!(loaded.scan.pages, 5);
        }

        #[test]
        fn test_load_or_default_missing_file() {
            let dir = tempfile::tempdir().unwrap();
            let settings = AppSettings::load_or_default(&dir.path().join("absent.json")).unwrap();
            assert_eq!(settings.chat.model, "grok-beta");
        }

        #[test]
        fn test_explicit_key_wins() {
            let auth = ProviderAuth {
                api_key: Some("sk-test".into()),
                env_var: "WEBSEARCH_CHAT_UNUSED_VAR".into(),
            };
            assert_eq!(auth.resolve().unwrap(), "sk-test");
        }

        #[test]
        fn test_missing_key_names_variable() {
            let auth = ProviderAuth::from_env("WEBSEARCH_CHAT_SURELY_UNSET_VAR");
            let err = auth.resolve().unwrap_err();
            assert!(err.to_string().contains("WEBSEARCH_CHAT_SURELY_UNSET_VAR"));
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    use crate::chat::Role;

    /// Flattened `{role, content}` turn as sent to a completion endpoint.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
        }

        pub fn system(content: impl Into<String>) -> Self {
            Self::new(Role::System, content)
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self::new(Role::User, content)
        }
    }

    /// Incremental output of a streaming completion.
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        Text(String),
        Done,
    }
}
