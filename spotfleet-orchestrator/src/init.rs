use crate::error::OrchestratorError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use spotfleet_common::InitPayload;

const REMOTE_SCRIPT_PATH: &str = "/tmp/spotfleet-init.sh";

/// Init payload resolved once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreparedInit {
    #[default]
    None,
    /// Base64 custom data handed to the create call.
    CustomData(String),
    /// Shell lines executed through run-command once the instance is up.
    PostCreate(Vec<String>),
}

impl PreparedInit {
    pub fn custom_data(&self) -> Option<String> {
        match self {
            PreparedInit::CustomData(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn post_create(&self) -> Option<&[String]> {
        match self {
            PreparedInit::PostCreate(lines) => Some(lines),
            _ => None,
        }
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Download-and-run lines for a remote script.
pub fn fetch_script(url: &str) -> Vec<String> {
    let path = REMOTE_SCRIPT_PATH;
    vec![
        "set -e".to_string(),
        format!(
            "curl -fsSL --retry 5 --retry-delay 3 {} -o {} || wget -qO {} {}",
            shell_quote(url),
            path,
            path,
            shell_quote(url)
        ),
        format!("chmod +x {}", path),
        format!("sudo {}", path),
    ]
}

pub async fn prepare(payload: Option<&InitPayload>) -> Result<PreparedInit, OrchestratorError> {
    match payload {
        None => Ok(PreparedInit::None),
        Some(InitPayload::Inline(script)) if script.trim().is_empty() => Ok(PreparedInit::None),
        Some(InitPayload::Inline(script)) => Ok(PreparedInit::CustomData(STANDARD.encode(script))),
        Some(InitPayload::Url(url)) => {
            let url = url.trim();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(OrchestratorError::InitPayload {
                    source_ref: url.to_string(),
                    message: "expected an http(s) URL".to_string(),
                });
            }
            Ok(PreparedInit::PostCreate(fetch_script(url)))
        }
        Some(InitPayload::File(path)) => {
            let body = tokio::fs::read_to_string(path).await.map_err(|e| {
                OrchestratorError::InitPayload {
                    source_ref: path.clone(),
                    message: e.to_string(),
                }
            })?;
            Ok(PreparedInit::PostCreate(
                body.lines().map(|l| l.to_string()).collect(),
            ))
        }
    }
}
