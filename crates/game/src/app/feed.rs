use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use engine::CommandEnvelope;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One line of the host feed: a backend command or a stage change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum FeedMessage {
    Command {
        envelope: CommandEnvelope,
        #[serde(default)]
        replay: bool,
    },
    Viewport {
        width: f32,
        height: f32,
    },
    Visibility {
        visible: bool,
    },
    Loading {
        blocked: bool,
    },
    Spawn {
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        flavor: Option<String>,
    },
}

#[derive(Debug, Error)]
pub(crate) enum FeedError {
    #[error("feed line {line} is malformed: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("feed line {line} is invalid at {path}: {source}")]
    Invalid {
        line: usize,
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn parse_line(line: usize, raw: &str) -> Result<FeedMessage, FeedError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let source = error.into_inner();
        if path.is_empty() || path == "." {
            FeedError::Malformed { line, source }
        } else {
            FeedError::Invalid { line, path, source }
        }
    })
}

/// Line-delimited JSON messages read on a background thread.
pub(crate) struct CommandFeed {
    messages: Receiver<FeedMessage>,
}

impl CommandFeed {
    pub(crate) fn from_stdin() -> io::Result<Self> {
        Self::from_reader(stdin_reader())
    }

    pub(crate) fn from_reader<R>(reader: R) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        thread::Builder::new()
            .name("command-feed".to_string())
            .spawn(move || read_feed(reader, sender))?;
        Ok(Self { messages: receiver })
    }

    /// Messages received since the last call, in arrival order.
    pub(crate) fn drain(&self) -> Vec<FeedMessage> {
        self.messages.try_iter().collect()
    }

    #[cfg(test)]
    pub(crate) fn recv_timeout(&self, timeout: std::time::Duration) -> Option<FeedMessage> {
        self.messages.recv_timeout(timeout).ok()
    }
}

fn stdin_reader() -> io::BufReader<io::Stdin> {
    io::BufReader::new(io::stdin())
}

fn read_feed<R: BufRead>(reader: R, sender: Sender<FeedMessage>) {
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let raw = match line {
            Ok(raw) => raw,
            Err(error) => {
                warn!(error = %error, "command_feed_read_failed");
                break;
            }
        };
        if raw.trim().is_empty() {
            continue;
        }
        match parse_line(line_number, &raw) {
            Ok(message) => {
                debug!(line = line_number, "command_feed_message");
                if sender.send(message).is_err() {
                    break;
                }
            }
            Err(error) => warn!(error = %error, "command_feed_line_rejected"),
        }
    }
    info!("command_feed_closed");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_commands_and_stage_changes() {
        let message = parse_line(
            1,
            r#"{"type": "command", "envelope": {"is_ok": true, "command": "balloons",
                "parameters": ["Bird"], "uuid": "u-1", "payload": {"flavor": "f"}}}"#,
        )
        .expect("command");
        match message {
            FeedMessage::Command { envelope, replay } => {
                assert!(!replay);
                assert_eq!(envelope.uuid(), Some("u-1"));
            }
            other => panic!("unexpected message {other:?}"),
        }

        assert_eq!(
            parse_line(2, r#"{"type": "visibility", "visible": false}"#).expect("visibility"),
            FeedMessage::Visibility { visible: false }
        );
        assert_eq!(
            parse_line(3, r#"{"type": "spawn", "kind": "Bird"}"#).expect("spawn"),
            FeedMessage::Spawn {
                kind: Some("Bird".to_string()),
                flavor: None,
            }
        );
    }

    #[test]
    fn rejects_broken_lines_with_line_number() {
        assert!(matches!(
            parse_line(4, "{not json"),
            Err(FeedError::Malformed { line: 4, .. })
        ));
        let error = parse_line(5, r#"{"type": "viewport", "width": "wide", "height": 3}"#)
            .expect_err("wrong type");
        assert!(error.to_string().starts_with("feed line 5"), "{error}");
        let error = parse_line(6, r#"{"type": "teleport"}"#).expect_err("unknown type");
        assert!(error.to_string().contains("teleport"), "{error}");
    }

    #[test]
    fn stdin_reader_can_move_to_feed_thread() {
        fn feed_source<R: BufRead + Send + 'static>(_reader: &R) {}
        feed_source(&stdin_reader());
    }

    #[test]
    fn reader_thread_skips_bad_lines() {
        let input = concat!(
            "{\"type\": \"loading\", \"blocked\": true}\n",
            "\n",
            "garbage\n",
            "{\"type\": \"viewport\", \"width\": 640, \"height\": 480}\n",
        );
        let feed = CommandFeed::from_reader(Cursor::new(input.as_bytes().to_vec())).expect("feed");
        let first = feed.recv_timeout(Duration::from_secs(5)).expect("first");
        let second = feed.recv_timeout(Duration::from_secs(5)).expect("second");
        assert_eq!(first, FeedMessage::Loading { blocked: true });
        assert_eq!(
            second,
            FeedMessage::Viewport {
                width: 640.0,
                height: 480.0,
            }
        );
        assert!(feed.recv_timeout(Duration::from_millis(200)).is_none());
    }
}
