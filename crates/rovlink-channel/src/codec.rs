//! Wire codec: one JSON object per WebSocket text frame.
//!
//! Everything is decoded exactly once, here, into the exhaustively matched
//! enums of `rovlink-types`.  Nothing past this boundary sees raw strings.

use rovlink_types::{ActuatorMessage, Command, RovError};
use serde::Serialize;
use serde_json::error::Category;

/// Encode any contract message as a JSON text frame.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, RovError> {
    serde_json::to_string(msg).map_err(|e| RovError::Codec(e.to_string()))
}

/// Decode and validate a controller→actuator command.
///
/// # Errors
///
/// * [`RovError::Codec`] – the frame is not well-formed JSON.
/// * [`RovError::InvalidCommand`] – well-formed JSON that is not a valid
///   command: unknown `type`, unrecognized direction, missing fields, or a
///   negative / non-finite duration.
pub fn decode_command(text: &str) -> Result<Command, RovError> {
    let cmd: Command = serde_json::from_str(text).map_err(|e| match e.classify() {
        Category::Data => RovError::InvalidCommand(e.to_string()),
        Category::Io | Category::Syntax | Category::Eof => RovError::Codec(e.to_string()),
    })?;
    cmd.validate()?;
    Ok(cmd)
}

/// Decode an actuator→controller message.
pub fn decode_actuator_message(text: &str) -> Result<ActuatorMessage, RovError> {
    serde_json::from_str(text).map_err(|e| RovError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlink_types::{Direction, SafetyAlert};

    #[test]
    fn decodes_valid_move() {
        let cmd =
            decode_command(r#"{"type":"move","payload":{"direction":"forward","duration":3.0}}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::Move {
                direction: Direction::Forward,
                duration: 3.0
            }
        );
    }

    #[test]
    fn malformed_json_is_a_codec_error() {
        let err = decode_command(r#"{"type":"move","#).unwrap_err();
        assert!(matches!(err, RovError::Codec(_)), "got {err:?}");
    }

    #[test]
    fn unknown_direction_is_an_invalid_command() {
        let err =
            decode_command(r#"{"type":"move","payload":{"direction":"up","duration":1.0}}"#)
                .unwrap_err();
        assert!(matches!(err, RovError::InvalidCommand(_)), "got {err:?}");
        assert!(err.to_string().contains("unrecognized direction"));
    }

    #[test]
    fn unknown_type_is_an_invalid_command() {
        let err = decode_command(r#"{"type":"dance"}"#).unwrap_err();
        assert!(matches!(err, RovError::InvalidCommand(_)));
    }

    #[test]
    fn negative_duration_is_rejected_after_decoding() {
        let err =
            decode_command(r#"{"type":"move","payload":{"direction":"l","duration":-2}}"#)
                .unwrap_err();
        assert!(matches!(err, RovError::InvalidCommand(_)));
    }

    #[test]
    fn actuator_message_wire_names() {
        let text = encode(&ActuatorMessage::StopComplete).unwrap();
        assert_eq!(text, r#"{"type":"stop_complete"}"#);

        let alert = ActuatorMessage::ObstacleAlert(SafetyAlert::new(None));
        let back = decode_actuator_message(&encode(&alert).unwrap()).unwrap();
        assert_eq!(back, alert);
    }

    #[test]
    fn ready_handshake_carries_actuator_id() {
        let msg = decode_actuator_message(r#"{"type":"ready","payload":{"actuator_id":"pi-01"}}"#)
            .unwrap();
        assert_eq!(
            msg,
            ActuatorMessage::Ready {
                actuator_id: "pi-01".into()
            }
        );
    }
}
