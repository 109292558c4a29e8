//! Request and response bodies exchanged with the EveBox server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
}

/// Identifies a group of alerts sharing signature and endpoints within a
/// time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroupSpec {
    pub signature_id: u64,
    pub src_ip: String,
    pub dest_ip: String,
    pub min_timestamp: String,
    pub max_timestamp: String,
}

impl AlertGroupSpec {
    /// Build from an alert group as returned by the alerts endpoint:
    /// `{"event": {"_source": {...}}, "minTs": ..., "maxTs": ...}`.
    pub fn from_alert_group(group: &serde_json::Value) -> Option<Self> {
        let source = &group["event"]["_source"];
        Some(Self {
            signature_id: source["alert"]["signature_id"].as_u64()?,
            src_ip: source["src_ip"].as_str()?.to_string(),
            dest_ip: source["dest_ip"].as_str()?.to_string(),
            min_timestamp: group["minTs"].as_str()?.to_string(),
            max_timestamp: group["maxTs"].as_str()?.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EventCommentRequest<'a> {
    pub event_id: &'a str,
    pub comment: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AlertGroupRequest<'a> {
    pub alert_group: &'a AlertGroupSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Capitalised on the wire for compatibility with older agents.
    #[serde(rename = "Count")]
    pub count: u64,
}
