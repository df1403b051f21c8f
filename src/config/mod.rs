//! Engine configuration.
//!
//! Provides [`EngineConfig`] (top-level settings), sub-configs for each
//! subsystem, [`AppPaths`] for cross-platform directories, and TOML
//! persistence via `EngineConfig::load` / `EngineConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AiConfig, AiTrigger, AudioConfig, AutoStopConfig, Device, EngineConfig, ParagraphConfig,
    SttConfig, TranslateConfig,
};
