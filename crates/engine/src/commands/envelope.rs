use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// One command result as delivered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandEnvelope {
    pub is_ok: bool,
    pub command: Option<String>,
    pub parameters: Vec<String>,
    pub uuid: Option<String>,
    pub method: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_template: Option<String>,
    pub error_parameters: BTreeMap<String, Value>,
    pub payload: Option<CommandPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandPayload {
    pub flavor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Debug,
    Reset,
    SwitchScene,
    System,
    /// Any other command names the scene a scanned actor belongs to.
    Actor { scene: String },
}

impl CommandKind {
    pub fn parse(command: &str) -> Self {
        match command {
            "debug" => Self::Debug,
            "reset" => Self::Reset,
            "switchScene" => Self::SwitchScene,
            "system" => Self::System,
            scene => Self::Actor {
                scene: scene.to_string(),
            },
        }
    }
}

impl CommandEnvelope {
    pub fn kind(&self) -> Option<CommandKind> {
        self.command.as_deref().map(CommandKind::parse)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref().filter(|uuid| !uuid.is_empty())
    }

    pub fn parameter(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }

    pub fn flavor(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.flavor.as_deref())
            .filter(|flavor| !flavor.is_empty())
    }

    pub(crate) fn error_text(&self) -> Option<String> {
        let template = self
            .error_template
            .as_deref()
            .filter(|text| !text.is_empty())
            .or_else(|| self.error_message.as_deref().filter(|text| !text.is_empty()))?;
        let parameters: Vec<(String, String)> = self
            .error_parameters
            .iter()
            .map(|(key, value)| (key.clone(), value_text(value)))
            .collect();
        let borrowed: Vec<(&str, &str)> = parameters
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        Some(fill_template(template, &borrowed))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Replaces each `{name}` with its value; unknown placeholders stay as they are.
pub(crate) fn fill_template(template: &str, parameters: &[(&str, &str)]) -> String {
    let mut filled = template.to_string();
    for (name, value) in parameters {
        filled = filled.replace(&format!("{{{name}}}"), value);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_tolerates_missing_fields() {
        let envelope: CommandEnvelope = serde_json::from_str(
            r#"{"is_ok": true, "command": "balloons", "parameters": ["Bird"],
                "uuid": "u-1", "payload": {"flavor": "f00"}}"#,
        )
        .expect("parse");
        assert_eq!(
            envelope.kind(),
            Some(CommandKind::Actor {
                scene: "balloons".to_string()
            })
        );
        assert_eq!(envelope.parameter(0), Some("Bird"));
        assert_eq!(envelope.flavor(), Some("f00"));
        assert_eq!(envelope.uuid(), Some("u-1"));
        assert_eq!(envelope.error_text(), None);

        let bare: CommandEnvelope = serde_json::from_str("{}").expect("parse");
        assert!(!bare.is_ok);
        assert_eq!(bare.kind(), None);
        assert_eq!(bare.uuid(), None);
    }

    #[test]
    fn reserved_keywords_are_not_actor_commands() {
        assert_eq!(CommandKind::parse("debug"), CommandKind::Debug);
        assert_eq!(CommandKind::parse("reset"), CommandKind::Reset);
        assert_eq!(CommandKind::parse("switchScene"), CommandKind::SwitchScene);
        assert_eq!(CommandKind::parse("system"), CommandKind::System);
    }

    #[test]
    fn error_text_prefers_template_and_fills_parameters() {
        let envelope: CommandEnvelope = serde_json::from_str(
            r#"{"error_message": "raw", "error_template": "Missing {what} ({count})",
                "error_parameters": {"what": "marker", "count": 3}}"#,
        )
        .expect("parse");
        assert_eq!(envelope.error_text().as_deref(), Some("Missing marker (3)"));
    }
}
