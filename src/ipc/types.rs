use std::path::PathBuf;

use crate::assistant::Assistant;
use crate::config::Config;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    pub assistant: Assistant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let assistant = Assistant::from_config(&config.assistant);
        Self {
            workspace: None,
            db: None,
            config,
            assistant,
        }
    }
}
