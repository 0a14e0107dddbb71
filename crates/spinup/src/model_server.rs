use spinup_core::ServiceConfig;

/// Line the model server prints once it accepts traffic
pub const READY_MARKER: &str = "Application startup complete.";

pub const DEFAULT_MODEL: &str = "facebook/opt-125m";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_MODEL_LEN: u32 = 4096;

/// Command-line recipe for an OpenAI-compatible model-serving endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ModelServer {
    pub model: String,
    pub port: u16,
    pub max_model_len: u32,
}

impl ModelServer {
    pub fn new(model: impl Into<String>, port: u16, max_model_len: u32) -> Self {
        Self {
            model: model.into(),
            port,
            max_model_len,
        }
    }

    /// Service name derived from the model identifier, safe for file names
    pub fn service_name(&self) -> String {
        self.model
            .chars()
            .map(|c| if c == '/' || c == ':' { '-' } else { c })
            .collect()
    }

    /// The server command and its arguments
    pub fn command_line(&self) -> (String, Vec<String>) {
        (
            "python3".to_string(),
            vec![
                "-m".to_string(),
                "vllm.entrypoints.openai.api_server".to_string(),
                "--model".to_string(),
                self.model.clone(),
                "--port".to_string(),
                self.port.to_string(),
                "--max-model-len".to_string(),
                self.max_model_len.to_string(),
            ],
        )
    }

    /// Build a ServiceConfig for this server; the log path is left for the
    /// caller to derive.
    pub fn into_config(self, marker: impl Into<String>) -> ServiceConfig {
        let name = self.service_name();
        let (command, args) = self.command_line();
        ServiceConfig {
            name,
            command,
            args,
            success_marker: marker.into(),
            ..ServiceConfig::default()
        }
    }
}

impl Default for ModelServer {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_MAX_MODEL_LEN)
    }
}
