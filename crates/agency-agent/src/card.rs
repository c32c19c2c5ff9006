//! The descriptor this agent publishes at the well-known path

use agency_framework::prelude::{AgentDescriptor, AgentServerConfig};
use serde_json::json;

pub fn build_descriptor(config: &AgentServerConfig) -> AgentDescriptor {
    let mut descriptor = AgentDescriptor::new(&config.agent_name, &config.description)
        .with_url(config.effective_url())
        .with_field("version", json!(env!("CARGO_PKG_VERSION")))
        .with_field(
            "capabilities",
            json!({ "streaming": true, "pushNotifications": false }),
        )
        .with_field("defaultInputModes", json!(["text"]))
        .with_field("defaultOutputModes", json!(["text"]))
        .with_field(
            "skills",
            json!([{
                "id": "echo",
                "name": "Echo",
                "description": "Repeats the request back, one word at a time",
                "tags": ["echo", "demo"],
                "examples": ["hello world"]
            }]),
        );

    if config.auth_enabled() {
        descriptor = descriptor
            .with_field(
                "securitySchemes",
                json!({
                    "bearer": { "type": "http", "scheme": "bearer" },
                    "basic": { "type": "http", "scheme": "basic" }
                }),
            )
            .with_field("security", json!([{ "bearer": [] }, { "basic": [] }]));
    }

    descriptor
}
