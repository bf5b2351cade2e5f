use std::env;
use std::fmt;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const MASTODON_ACCESS_TOKEN: &str = "MASTODON_ACCESS_TOKEN";
    pub const MASTODON_SERVER: &str = "MASTODON_SERVER";
    pub const BOT_ACCT: &str = "KITSUNE_BOT_ACCT";
    pub const HISTORY_PATH: &str = "KITSUNE_HISTORY_PATH";
    pub const SYSTEM_PROMPT_PATH: &str = "KITSUNE_SYSTEM_PROMPT_PATH";
    pub const GAME_HASHTAG: &str = "KITSUNE_GAME_HASHTAG";
    pub const SCORE_TRIGGER: &str = "KITSUNE_SCORE_TRIGGER";
    pub const MAX_CONCURRENT_MENTIONS: &str = "KITSUNE_MAX_CONCURRENT_MENTIONS";
}

/// Default values
pub mod defaults {
    pub const MASTODON_SERVER: &str = "https://mstdn.kemono-friends.info";
    pub const BOT_ACCT: &str = "kita_kitsune";
    pub const HISTORY_PATH: &str = "history.db";
    pub const SYSTEM_PROMPT_PATH: &str = "initial_system_prompt.txt";
    pub const GAME_HASHTAG: &str = "大喜利ドリーマー";
    pub const SCORE_TRIGGER: &str = "何点";
    pub const MAX_CONCURRENT_MENTIONS: usize = 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "{} must be set", var),
            ConfigError::Invalid { var, value } => write!(f, "{} has invalid value {:?}", var, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub mastodon_access_token: String,
    pub mastodon_server: String,
    /// `None` means "use the account the token belongs to"
    pub bot_acct: Option<String>,
    pub history_path: PathBuf,
    pub system_prompt_path: PathBuf,
    pub game_hashtag: String,
    pub score_trigger: String,
    pub max_concurrent_mentions: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mastodon_server", &self.mastodon_server)
            .field("bot_acct", &self.bot_acct)
            .field("history_path", &self.history_path)
            .field("system_prompt_path", &self.system_prompt_path)
            .field("game_hashtag", &self.game_hashtag)
            .field("score_trigger", &self.score_trigger)
            .field("max_concurrent_mentions", &self.max_concurrent_mentions)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let max_concurrent_mentions = match get(env_vars::MAX_CONCURRENT_MENTIONS) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: env_vars::MAX_CONCURRENT_MENTIONS,
                        value: raw,
                    })
                }
            },
            None => defaults::MAX_CONCURRENT_MENTIONS,
        };

        Ok(Self {
            openai_api_key: required(env_vars::OPENAI_API_KEY)?,
            mastodon_access_token: required(env_vars::MASTODON_ACCESS_TOKEN)?,
            mastodon_server: get(env_vars::MASTODON_SERVER)
                .unwrap_or_else(|| defaults::MASTODON_SERVER.to_string()),
            bot_acct: get(env_vars::BOT_ACCT).map(|acct| acct.trim_start_matches('@').to_string()),
            history_path: get(env_vars::HISTORY_PATH)
                .unwrap_or_else(|| defaults::HISTORY_PATH.to_string())
                .into(),
            system_prompt_path: get(env_vars::SYSTEM_PROMPT_PATH)
                .unwrap_or_else(|| defaults::SYSTEM_PROMPT_PATH.to_string())
                .into(),
            game_hashtag: get(env_vars::GAME_HASHTAG)
                .map(|tag| tag.trim_start_matches('#').to_string())
                .unwrap_or_else(|| defaults::GAME_HASHTAG.to_string()),
            score_trigger: get(env_vars::SCORE_TRIGGER)
                .unwrap_or_else(|| defaults::SCORE_TRIGGER.to_string()),
            max_concurrent_mentions,
        })
    }
}
