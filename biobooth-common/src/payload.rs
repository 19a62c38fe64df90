//! Wire payload contracts for the visualization channels
//!
//! The `eeg_ecg` field layout and the pub/sub JSON envelopes are consumed by
//! the exhibit's visualization front end and must remain stable across
//! engine changes.

use serde::Serialize;

/// Channel carrying the live fused biosignal values
pub const CHANNEL_EEG_ECG: &str = "eeg_ecg";

/// Channel carrying phase instruction prompts
pub const CHANNEL_INSTRUCTION: &str = "instruction";

/// Sentinel reported in place of a value that has not yet been observed.
/// Consumers must treat it as "unknown", never as a literal reading.
pub const ABSENT: f64 = -1.0;

/// Number of cortical scalar slots in the `eeg_ecg` payload
pub const CORTICAL_SLOTS: usize = 4;

/// Format the comma-joined `eeg_ecg` payload.
///
/// Field order: four cortical band-power scalars, then cardiac HRV, then
/// lead state (1 = on, 0 = off). The cortical slots carry the most recent
/// alpha values from the tick's drained batch, oldest first; when fewer than
/// four arrived the leading slots carry [`ABSENT`].
pub fn format_eeg_ecg(alpha: &[f64], hrv: f64, lead_on: bool) -> String {
    let mut slots = [ABSENT; CORTICAL_SLOTS];
    let take = alpha.len().min(CORTICAL_SLOTS);
    let newest = &alpha[alpha.len() - take..];
    slots[CORTICAL_SLOTS - take..].copy_from_slice(newest);

    format!(
        "{},{},{},{},{},{}",
        slots[0],
        slots[1],
        slots[2],
        slots[3],
        hrv,
        u8::from(lead_on)
    )
}

/// Instruction prompt text for a phase
pub fn instruction_text(condition: bool) -> &'static str {
    if condition {
        "condition"
    } else {
        "baseline"
    }
}

#[derive(Serialize)]
struct ChannelDecl {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct PublishDecl {
    messages: Vec<ChannelDecl>,
}

#[derive(Serialize)]
struct ConfigBody<'a> {
    name: &'a str,
    publish: PublishDecl,
}

#[derive(Serialize)]
struct ConfigAnnouncement<'a> {
    config: ConfigBody<'a>,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    #[serde(rename = "clientName")]
    client_name: &'a str,
}

#[derive(Serialize)]
struct MessageEnvelope<'a> {
    message: MessageBody<'a>,
}

/// One-time configuration announcement sent on connect, declaring the two
/// string-typed publish channels.
pub fn config_announcement(client_name: &str) -> String {
    let announcement = ConfigAnnouncement {
        config: ConfigBody {
            name: client_name,
            publish: PublishDecl {
                messages: vec![
                    ChannelDecl {
                        name: CHANNEL_EEG_ECG,
                        kind: "string",
                    },
                    ChannelDecl {
                        name: CHANNEL_INSTRUCTION,
                        kind: "string",
                    },
                ],
            },
        },
    };
    // Serialization of these fixed shapes cannot fail
    serde_json::to_string(&announcement).unwrap_or_default()
}

/// Publish envelope for one named string message
pub fn publish_envelope(client_name: &str, channel: &str, payload: &str) -> String {
    let envelope = MessageEnvelope {
        message: MessageBody {
            value: payload,
            kind: "string",
            name: channel,
            client_name,
        },
    };
    serde_json::to_string(&envelope).unwrap_or_default()
}
