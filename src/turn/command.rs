//! Data-channel message protocol between the agent and the client.
//!
//! Inbound parsing is defensive: anything that is not well-formed JSON
//! beginning with `{` is silently ignored; the channel also carries
//! payloads meant for other consumers, so a bad frame is never an error.

use crate::verify::VerificationOutcome;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A command or message received from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    /// Arm listening and start the next recording turn.
    StartRecord,
    /// Stop an in-flight recording immediately.
    StopRecord,
    /// The agent is ready for the user; allow the next turn to proceed.
    ReadyForUser,
    /// A recognized non-voice message (product cards, chat text, …),
    /// surfaced verbatim for the UI layer.
    Other { kind: String, payload: String },
}

/// Loose view of an inbound message; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct RawAgentMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    action: Option<String>,
}

impl AgentCommand {
    /// Parse a data-channel payload.
    ///
    /// Returns `None` for anything malformed: non-UTF-8 bytes, text not
    /// starting with `{`, invalid JSON, or messages with neither a type
    /// nor an action.
    pub fn parse(payload: &[u8]) -> Option<AgentCommand> {
        let text = std::str::from_utf8(payload).ok()?.trim();
        if !text.starts_with('{') {
            return None;
        }

        let raw: RawAgentMessage = serde_json::from_str(text).ok()?;

        let is_voice_cmd = raw.kind.as_deref() == Some("VOICE_CMD") || raw.action.is_some();
        if is_voice_cmd {
            return match raw.action.as_deref() {
                Some("START_RECORD") => Some(AgentCommand::StartRecord),
                Some("STOP_RECORD") => Some(AgentCommand::StopRecord),
                Some("READY_FOR_USER") => Some(AgentCommand::ReadyForUser),
                _ => raw.kind.map(|kind| AgentCommand::Other {
                    kind,
                    payload: text.to_string(),
                }),
            };
        }

        raw.kind.map(|kind| AgentCommand::Other {
            kind,
            payload: text.to_string(),
        })
    }
}

/// Verification result published back to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub decision: crate::verify::Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Epoch milliseconds at publish time.
    pub ts: u64,
}

impl VerificationReport {
    /// Build a report from an outcome, stamped with the current time.
    pub fn from_outcome(outcome: &VerificationOutcome) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            decision: outcome.decision,
            score: outcome.score,
            ts,
        }
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Decision;

    #[test]
    fn test_parse_start_record() {
        let payload = br#"{"type":"VOICE_CMD","action":"START_RECORD"}"#;
        assert_eq!(AgentCommand::parse(payload), Some(AgentCommand::StartRecord));
    }

    #[test]
    fn test_parse_stop_record() {
        let payload = br#"{"type":"VOICE_CMD","action":"STOP_RECORD"}"#;
        assert_eq!(AgentCommand::parse(payload), Some(AgentCommand::StopRecord));
    }

    #[test]
    fn test_parse_ready_for_user() {
        let payload = br#"{"type":"VOICE_CMD","action":"READY_FOR_USER"}"#;
        assert_eq!(
            AgentCommand::parse(payload),
            Some(AgentCommand::ReadyForUser)
        );
    }

    #[test]
    fn test_parse_action_without_type_tag() {
        // Older agents omit the VOICE_CMD tag and send bare actions
        let payload = br#"{"action":"STOP_RECORD"}"#;
        assert_eq!(AgentCommand::parse(payload), Some(AgentCommand::StopRecord));
    }

    #[test]
    fn test_parse_tolerates_extra_fields() {
        let payload = br#"{"type":"VOICE_CMD","action":"START_RECORD","attempt":2}"#;
        assert_eq!(AgentCommand::parse(payload), Some(AgentCommand::StartRecord));
    }

    #[test]
    fn test_parse_other_message_kinds_surface_verbatim() {
        let payload = br#"{"type":"PRODUCT_CARDS","products":[{"name":"shoe"}]}"#;
        match AgentCommand::parse(payload) {
            Some(AgentCommand::Other { kind, payload }) => {
                assert_eq!(kind, "PRODUCT_CARDS");
                assert!(payload.contains("shoe"));
            }
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_agent_message() {
        let payload = br#"{"type":"AGENT_MESSAGE","text":"Here are three options"}"#;
        match AgentCommand::parse(payload) {
            Some(AgentCommand::Other { kind, .. }) => assert_eq!(kind, "AGENT_MESSAGE"),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payloads_ignored() {
        assert_eq!(AgentCommand::parse(b"not json"), None);
        assert_eq!(AgentCommand::parse(b""), None);
        assert_eq!(AgentCommand::parse(b"[1,2,3]"), None);
        assert_eq!(AgentCommand::parse(b"{\"type\":"), None);
        assert_eq!(AgentCommand::parse(&[0xff, 0xfe, 0x7b]), None);
    }

    #[test]
    fn test_json_without_type_or_action_ignored() {
        assert_eq!(AgentCommand::parse(b"{\"hello\":\"world\"}"), None);
    }

    #[test]
    fn test_leading_whitespace_tolerated() {
        let payload = b"  {\"type\":\"VOICE_CMD\",\"action\":\"START_RECORD\"}  ";
        assert_eq!(AgentCommand::parse(payload), Some(AgentCommand::StartRecord));
    }

    #[test]
    fn test_unknown_action_with_voice_cmd_tag_surfaces_as_other() {
        let payload = br#"{"type":"VOICE_CMD","action":"CALIBRATE"}"#;
        match AgentCommand::parse(payload) {
            Some(AgentCommand::Other { kind, .. }) => assert_eq!(kind, "VOICE_CMD"),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn test_report_wire_format() {
        let report = VerificationReport {
            decision: Decision::Verified,
            score: Some(0.91),
            ts: 1754400000000,
        };
        let json = report.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"decision":"VERIFIED","score":0.91,"ts":1754400000000}"#
        );
    }

    #[test]
    fn test_report_omits_missing_score() {
        let report = VerificationReport {
            decision: Decision::Denied,
            score: None,
            ts: 1,
        };
        let json = report.to_json().unwrap();
        assert_eq!(json, r#"{"decision":"DENIED","ts":1}"#);
    }

    #[test]
    fn test_report_roundtrip() {
        let report = VerificationReport {
            decision: Decision::Repeat,
            score: Some(0.5),
            ts: 42,
        };
        let json = report.to_json().unwrap();
        let back: VerificationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_from_outcome_stamps_time() {
        let outcome = VerificationOutcome {
            decision: Decision::Verified,
            score: Some(0.8),
            reason: None,
        };
        let report = VerificationReport::from_outcome(&outcome);
        assert_eq!(report.decision, Decision::Verified);
        assert_eq!(report.score, Some(0.8));
        assert!(report.ts > 0);
    }
}
