use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use rolesync_application::{CleanupSettings, DEFAULT_PAGE_SIZE};
use rolesync_core::{AppError, AppResult};

const MAX_PAGE_SIZE: u32 = 5000;

#[derive(Debug, Clone)]
pub(crate) struct ReconcilerConfig {
    pub(crate) api_url: Url,
    pub(crate) directory_url: Url,
    pub(crate) access_token: String,
    pub(crate) config_path: PathBuf,
    pub(crate) directory_export_path: Option<PathBuf>,
    pub(crate) http_timeout: Duration,
    pub(crate) settings: CleanupSettings,
}

impl ReconcilerConfig {
    pub(crate) fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let env = EnvReader { lookup };

        let api_url = env.url("ROLESYNC_API_URL")?;
        let directory_url = env.url("ROLESYNC_DIRECTORY_URL")?;
        let access_token = env.required("ROLESYNC_ACCESS_TOKEN")?;
        let config_path = PathBuf::from(env.required("ROLESYNC_CONFIG_PATH")?);
        let directory_export_path = env
            .optional("ROLESYNC_DIRECTORY_EXPORT_PATH")
            .map(PathBuf::from);
        let peek = env.bool("ROLESYNC_PEEK", false)?;
        let page_size = env.u32("ROLESYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let job_timeout_seconds = env.u64("ROLESYNC_JOB_TIMEOUT_SECONDS", 60)?;
        let job_poll_interval_ms = env.u64("ROLESYNC_JOB_POLL_INTERVAL_MS", 1000)?;
        let http_timeout_seconds = env.u64("ROLESYNC_HTTP_TIMEOUT_SECONDS", 30)?;

        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "ROLESYNC_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        for (name, value) in [
            ("ROLESYNC_JOB_TIMEOUT_SECONDS", job_timeout_seconds),
            ("ROLESYNC_JOB_POLL_INTERVAL_MS", job_poll_interval_ms),
            ("ROLESYNC_HTTP_TIMEOUT_SECONDS", http_timeout_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(Self {
            api_url,
            directory_url,
            access_token,
            config_path,
            directory_export_path,
            http_timeout: Duration::from_secs(http_timeout_seconds),
            settings: CleanupSettings {
                page_size,
                peek,
                job_timeout: Duration::from_secs(job_timeout_seconds),
                job_poll_interval: Duration::from_millis(job_poll_interval_ms),
            },
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn url(&self, name: &str) -> AppResult<Url> {
        let value = self.required(name)?;
        Url::parse(&value).map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        })
    }

    fn bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(AppError::Validation(format!(
                    "invalid {name} value '{value}': expected true or false"
                ))),
            },
            None => Ok(default),
        }
    }

    fn u32(&self, name: &str, default: u32) -> AppResult<u32> {
        match self.optional(name) {
            Some(value) => value.parse::<u32>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }

    fn u64(&self, name: &str, default: u64) -> AppResult<u64> {
        match self.optional(name) {
            Some(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }
}
