//! Serde wire types for the slice of the Discord API the bot touches:
//! gateway payloads and application-command interactions.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

// Gateway opcodes the bot handles.
pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

/// Envelope for every gateway frame.
#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    pub s: Option<u64>,
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct Ready {
    pub application: Application,
}

#[derive(Debug, Deserialize)]
pub struct Application {
    pub id: String,
}

/// An INTERACTION_CREATE payload. Only the fields the handlers read.
#[derive(Debug, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub data: Option<CommandData>,
    /// Present in guilds.
    pub member: Option<Member>,
    /// Present in DMs.
    pub user: Option<User>,
    pub channel: Option<PartialChannel>,
}

pub const INTERACTION_TYPE_COMMAND: u8 = 2;

impl Interaction {
    pub fn user_id(&self) -> Option<&str> {
        self.member
            .as_ref()
            .map(|m| m.user.id.as_str())
            .or(self.user.as_ref().map(|u| u.id.as_str()))
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_ref().and_then(|c| c.name.as_deref())
    }

    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    pub resolved: Option<Resolved>,
}

impl CommandData {
    /// String-valued option by name.
    pub fn str_option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_str())
    }

    /// Attachment-valued option by name, resolved through the interaction's
    /// attachment map.
    pub fn attachment_option(&self, name: &str) -> Option<&Attachment> {
        let id = self
            .options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_str())?;
        self.resolved.as_ref()?.attachments.get(id)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resolved {
    #[serde(default)]
    pub attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub size: u64,
    pub url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialChannel {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_with_attachment_parses() {
        let raw = r#"{
            "id": "123",
            "token": "tok",
            "type": 2,
            "channel": { "id": "555", "name": "coach" },
            "member": { "user": { "id": "42", "username": "alice" } },
            "data": {
                "name": "coach",
                "options": [
                    { "name": "question", "type": 3, "value": "What is risk?" },
                    { "name": "file", "type": 11, "value": "999" }
                ],
                "resolved": {
                    "attachments": {
                        "999": {
                            "id": "999",
                            "filename": "guide.pdf",
                            "size": 52000,
                            "url": "https://cdn.example/guide.pdf",
                            "content_type": "application/pdf"
                        }
                    }
                }
            }
        }"#;
        let i: Interaction = serde_json::from_str(raw).unwrap();
        assert_eq!(i.kind, INTERACTION_TYPE_COMMAND);
        assert_eq!(i.user_id(), Some("42"));
        assert_eq!(i.channel_name(), Some("coach"));
        assert_eq!(i.command_name(), Some("coach"));

        let data = i.data.as_ref().unwrap();
        assert_eq!(data.str_option("question"), Some("What is risk?"));
        let attachment = data.attachment_option("file").unwrap();
        assert_eq!(attachment.filename, "guide.pdf");
        assert_eq!(attachment.content_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn dm_interaction_uses_top_level_user() {
        let raw = r#"{
            "id": "1",
            "token": "t",
            "type": 2,
            "user": { "id": "7" },
            "data": { "name": "health" }
        }"#;
        let i: Interaction = serde_json::from_str(raw).unwrap();
        assert_eq!(i.user_id(), Some("7"));
        assert_eq!(i.channel_name(), None);
        assert!(i.data.unwrap().options.is_empty());
    }

    #[test]
    fn gateway_hello_parses() {
        let raw = r#"{ "op": 10, "d": { "heartbeat_interval": 41250 }, "s": null, "t": null }"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.op, OP_HELLO);
        let hello: Hello = serde_json::from_value(event.d).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }
}
