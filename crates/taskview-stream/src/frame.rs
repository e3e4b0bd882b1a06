use std::fmt;

use serde::{Deserialize, Serialize};

/// Which output file a tailed record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One framed record on a viewer channel.
///
/// Output records carry whole lines including the trailing newline. System
/// records cover the connected/timeout/completed/shutdown notices; the event
/// class is conveyed by the message body, the `type` field is always
/// `"system"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "stdout")]
    Stdout { data: String },
    #[serde(rename = "stderr")]
    Stderr { data: String },
    #[serde(rename = "system")]
    System {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
}

impl Frame {
    pub fn output(stream: OutputStream, data: impl Into<String>) -> Self {
        match stream {
            OutputStream::Stdout => Self::Stdout { data: data.into() },
            OutputStream::Stderr => Self::Stderr { data: data.into() },
        }
    }

    pub fn system(message: impl Into<String>, pid: Option<u32>) -> Self {
        Self::System {
            message: message.into(),
            pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_output_frame_wire_shape() {
        let frame = Frame::output(OutputStream::Stdout, "hello\n");
        let wire = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(wire, r#"{"type":"stdout","data":"hello\n"}"#);

        let frame = Frame::output(OutputStream::Stderr, "oops\n");
        let wire = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(wire, r#"{"type":"stderr","data":"oops\n"}"#);
    }

    #[test]
    fn unit_system_frame_omits_absent_pid() {
        let frame = Frame::system("WebSocket connected. Process started", Some(42));
        let wire = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(
            wire,
            r#"{"type":"system","message":"WebSocket connected. Process started","pid":42}"#
        );

        let frame = Frame::system("Server is shutting down", None);
        let wire = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(wire, r#"{"type":"system","message":"Server is shutting down"}"#);
    }

    #[test]
    fn unit_frame_round_trips_through_json() {
        for frame in [
            Frame::output(OutputStream::Stdout, "line\n"),
            Frame::system("Process ended with exit code: 0", Some(7)),
        ] {
            let wire = serde_json::to_string(&frame).expect("serialize");
            let parsed: Frame = serde_json::from_str(&wire).expect("deserialize");
            assert_eq!(parsed, frame);
        }
    }
}
