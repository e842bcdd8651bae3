// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The 3-frame envelope every procflow endpoint carries
//!
//! Wire form: `[worker_id, tag, body]`
//! - `worker_id`: decimal ASCII, or empty for daemon and balancer traffic
//! - `tag`: `cmd` or `data`
//! - `body`: a [`Command`] name when tagged `cmd`, opaque bytes when tagged `data`
//!
//! PUB/SUB filtering matches on the first frame, so a subscriber filtering on
//! `"1"` also sees `"12"`; receivers must compare [`Envelope::worker_id`] exactly.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use super::error::{TransportError, TransportResult};

/// Small integer identifying a live worker within one pool
pub type WorkerId = u32;

const TAG_CMD: &[u8] = b"cmd";
const TAG_DATA: &[u8] = b"data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Cmd,
    Data,
}

impl Tag {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Tag::Cmd => TAG_CMD,
            Tag::Data => TAG_DATA,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> TransportResult<Self> {
        match bytes {
            TAG_CMD => Ok(Tag::Cmd),
            TAG_DATA => Ok(Tag::Data),
            other => Err(TransportError::InvalidMessage(format!(
                "Unknown envelope tag '{}'",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// Directive and acknowledgment vocabulary of `cmd` envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Stopped,
    Finished,
    Kill,
    /// Load-balanced worker announcing it is idle
    Ready,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Pause => "PAUSE",
            Command::Resume => "RESUME",
            Command::Stopped => "STOPPED",
            Command::Finished => "FINISHED",
            Command::Kill => "KILL",
            Command::Ready => "READY",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> TransportResult<Self> {
        match bytes {
            b"START" => Ok(Command::Start),
            b"STOP" => Ok(Command::Stop),
            b"PAUSE" => Ok(Command::Pause),
            b"RESUME" => Ok(Command::Resume),
            b"STOPPED" => Ok(Command::Stopped),
            b"FINISHED" => Ok(Command::Finished),
            b"KILL" => Ok(Command::Kill),
            b"READY" => Ok(Command::Ready),
            other => Err(TransportError::InvalidMessage(format!(
                "Unknown command '{}'",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Command(Command),
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub worker_id: Option<WorkerId>,
    pub payload: Payload,
}

impl Envelope {
    pub fn command(worker_id: Option<WorkerId>, command: Command) -> Self {
        Self {
            worker_id,
            payload: Payload::Command(command),
        }
    }

    pub fn data(worker_id: Option<WorkerId>, body: Vec<u8>) -> Self {
        Self {
            worker_id,
            payload: Payload::Data(body),
        }
    }

    /// `data` envelope carrying `value` as JSON
    pub fn json<T: Serialize>(worker_id: Option<WorkerId>, value: &T) -> TransportResult<Self> {
        Ok(Self::data(worker_id, serde_json::to_vec(value)?))
    }

    pub fn tag(&self) -> Tag {
        match self.payload {
            Payload::Command(_) => Tag::Cmd,
            Payload::Data(_) => Tag::Data,
        }
    }

    pub fn as_command(&self) -> Option<Command> {
        match self.payload {
            Payload::Command(command) => Some(command),
            Payload::Data(_) => None,
        }
    }

    pub fn is_command(&self, command: Command) -> bool {
        self.as_command() == Some(command)
    }

    pub fn body(&self) -> &[u8] {
        match &self.payload {
            Payload::Command(command) => command.as_str().as_bytes(),
            Payload::Data(body) => body,
        }
    }

    /// Decode a JSON `data` body
    pub fn decode<T: DeserializeOwned>(&self) -> TransportResult<T> {
        match &self.payload {
            Payload::Data(body) => Ok(serde_json::from_slice(body)?),
            Payload::Command(command) => Err(TransportError::InvalidMessage(format!(
                "Expected data envelope, got command {}",
                command
            ))),
        }
    }

    /// Subscription prefix addressing a worker on a PUB channel
    pub fn topic_for(worker_id: WorkerId) -> Vec<u8> {
        worker_id.to_string().into_bytes()
    }

    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        let id_frame = match self.worker_id {
            Some(id) => Self::topic_for(id),
            None => Vec::new(),
        };
        vec![id_frame, self.tag().as_bytes().to_vec(), self.body().to_vec()]
    }

    pub fn from_frames(mut frames: Vec<Vec<u8>>) -> TransportResult<Self> {
        if frames.len() != 3 {
            return Err(TransportError::InvalidMessage(format!(
                "Expected 3 envelope frames, got {}",
                frames.len()
            )));
        }
        let body = frames.pop().unwrap_or_default();
        let tag = Tag::from_bytes(&frames[1])?;
        let worker_id = parse_worker_id(&frames[0])?;

        let payload = match tag {
            Tag::Cmd => Payload::Command(Command::from_bytes(&body)?),
            Tag::Data => Payload::Data(body),
        };
        Ok(Self { worker_id, payload })
    }
}

fn parse_worker_id(frame: &[u8]) -> TransportResult<Option<WorkerId>> {
    if frame.is_empty() {
        return Ok(None);
    }
    std::str::from_utf8(frame)
        .ok()
        .and_then(|s| s.parse::<WorkerId>().ok())
        .map(Some)
        .ok_or_else(|| {
            TransportError::InvalidMessage(format!(
                "Invalid worker id frame '{}'",
                String::from_utf8_lossy(frame)
            ))
        })
}

/// Socket identity of a load-balanced worker: `"<worker-type>-<id>"`
///
/// Whitespace in the worker type becomes `-`.
pub fn create_identity(worker_type: &str, worker_id: WorkerId) -> Vec<u8> {
    let kind: String = worker_type
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("{}-{}", kind, worker_id).into_bytes()
}

/// Recover the worker id from the last `-`-separated segment of an identity
pub fn worker_id_from_identity(identity: &[u8]) -> Option<WorkerId> {
    std::str::from_utf8(identity)
        .ok()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frames() {
        let envelope = Envelope::command(Some(12), Command::Stop);
        assert_eq!(
            envelope.to_frames(),
            vec![b"12".to_vec(), b"cmd".to_vec(), b"STOP".to_vec()]
        );
    }

    #[test]
    fn test_daemon_envelope_has_empty_id() {
        let envelope = Envelope::data(None, b"payload".to_vec());
        let frames = envelope.to_frames();
        assert!(frames[0].is_empty());

        let decoded = Envelope::from_frames(frames).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_rejects_wrong_frame_count() {
        let result = Envelope::from_frames(vec![b"1".to_vec(), b"cmd".to_vec()]);
        assert!(matches!(result, Err(TransportError::InvalidMessage(_))));
    }

    #[test]
    fn test_rejects_unknown_tag_and_command() {
        let bad_tag = Envelope::from_frames(vec![vec![], b"ctl".to_vec(), b"STOP".to_vec()]);
        assert!(bad_tag.is_err());

        let bad_cmd = Envelope::from_frames(vec![vec![], b"cmd".to_vec(), b"HALT".to_vec()]);
        assert!(bad_cmd.is_err());

        let bad_id = Envelope::from_frames(vec![b"x1".to_vec(), b"data".to_vec(), vec![]]);
        assert!(bad_id.is_err());
    }

    #[test]
    fn test_data_body_is_opaque() {
        // A data body that happens to spell a command stays data
        let frames = vec![b"3".to_vec(), b"data".to_vec(), b"STOP".to_vec()];
        let envelope = Envelope::from_frames(frames).unwrap();
        assert_eq!(envelope.as_command(), None);
        assert_eq!(envelope.body(), b"STOP");
    }

    #[test]
    fn test_json_decode() {
        let envelope = Envelope::json(Some(2), &vec![1u32, 2, 3]).unwrap();
        let values: Vec<u32> = envelope.decode().unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        assert!(Envelope::command(None, Command::Ready).decode::<u32>().is_err());
    }

    #[test]
    fn test_identity_helpers() {
        let identity = create_identity("Thumbnail Extractor", 7);
        assert_eq!(identity, b"Thumbnail-Extractor-7".to_vec());
        assert_eq!(worker_id_from_identity(&identity), Some(7));
        assert_eq!(worker_id_from_identity(b"no-id-here"), None);
    }
}
