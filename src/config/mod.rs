//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, EngineSettings, GenerationSettings, LogFormat, LoggingConfig, RetrievalSettings,
};
