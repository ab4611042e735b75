//! Cloud-build trigger client.
//!
//! One WebSocket connection per publish run. Connection parameters travel as
//! the query string: `repo`, `name`, `branch`, `version`, `buildCmd`, `prod`.
//! The server replies with a stream of JSON events shaped
//! `{"action": "...", "payload": {"message": "..."}}`; the first event
//! carries the task id. The session is a state machine driven by inbound
//! actions, with a watchdog that aborts the connection if it is not
//! established within [`CONNECT_TIMEOUT`].

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::error::{CliError, Result};
use crate::ui;

/// Watchdog for the initial connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling for one build once connected.
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Failure codes the build service may report; any of them aborts the publish.
pub const FAILED_CODES: [&str; 6] = [
    "prepare failed",
    "download failed",
    "install failed",
    "build failed",
    "pre-publish failed",
    "publish failed",
];

pub fn is_failure_code(action: &str) -> bool {
    FAILED_CODES.contains(&action)
}

/// Session lifecycle, driven by inbound events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Connecting,
    Connected { task_id: String },
    Building,
    Done,
    Failed { code: String },
}

/// One inbound event from the build service.
#[derive(Debug, Deserialize)]
pub struct BuildEvent {
    pub action: String,
    pub payload: BuildPayload,
}

#[derive(Debug, Deserialize)]
pub struct BuildPayload {
    #[serde(default)]
    pub message: String,
}

/// Handshake parameters for one build session.
pub struct BuildParams<'a> {
    pub repo: &'a str,
    pub name: &'a str,
    pub branch: &'a str,
    pub version: &'a str,
    pub build_cmd: &'a str,
    pub prod: bool,
}

/// Applies one inbound action to the session state.
///
/// Pure transition function; does no socket I/O.
pub fn apply_event(state: &BuildState, event: &BuildEvent) -> BuildState {
    // `error` and the classified failure codes are terminal from any state.
    if event.action == "error" || is_failure_code(&event.action) {
        return BuildState::Failed {
            code: event.action.clone(),
        };
    }
    match state {
        BuildState::Connecting => match event.action.as_str() {
            "disconnect" => BuildState::Done,
            _ => BuildState::Connected {
                task_id: event.payload.message.clone(),
            },
        },
        BuildState::Connected { .. } | BuildState::Building => match event.action.as_str() {
            "disconnect" => BuildState::Done,
            _ => BuildState::Building,
        },
        terminal => terminal.clone(),
    }
}

/// WebSocket client for the cloud-build service.
pub struct CloudBuild {
    url: Url,
    state: BuildState,
}

impl CloudBuild {
    /// Assembles the connection URL from the configured server endpoint and
    /// the handshake parameters.
    pub fn new(server: &str, params: &BuildParams) -> Result<Self> {
        let mut url = Url::parse(server)
            .map_err(|e| CliError::remote_state(format!("invalid build server url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("repo", params.repo)
            .append_pair("name", params.name)
            .append_pair("branch", params.branch)
            .append_pair("version", params.version)
            .append_pair("buildCmd", params.build_cmd)
            .append_pair("prod", if params.prod { "true" } else { "false" });
        Ok(CloudBuild {
            url,
            state: BuildState::Connecting,
        })
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Runs the session to completion: connect, request the build, stream
    /// progress, and classify the outcome.
    pub fn run(&mut self) -> Result<()> {
        let mut socket = self.connect()?;

        loop {
            let message = match socket.read() {
                Ok(message) => message,
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    let _ = socket.close(None);
                    return Err(CliError::timeout(
                        "cloud build produced no events before the deadline",
                    ));
                }
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(e) => {
                    return Err(CliError::remote_state(format!(
                        "cloud build connection error: {}",
                        e
                    )))
                }
            };

            match message {
                Message::Text(text) => {
                    let event: BuildEvent = serde_json::from_str(&text).map_err(|e| {
                        CliError::remote_state(format!("malformed build event: {}", e))
                    })?;
                    let was_connecting = matches!(self.state, BuildState::Connecting);
                    self.state = apply_event(&self.state, &event);
                    self.report(&event);

                    match &self.state {
                        BuildState::Connected { .. } if was_connecting => {
                            // Connection established clears the watchdog and
                            // kicks off the build.
                            socket.get_ref().set_read_timeout(Some(BUILD_TIMEOUT))?;
                            socket
                                .send(Message::Text(r#"{"action":"build"}"#.to_string()))
                                .map_err(|e| {
                                    CliError::remote_state(format!(
                                        "failed to request build: {}",
                                        e
                                    ))
                                })?;
                        }
                        BuildState::Done => {
                            let _ = socket.close(None);
                            break;
                        }
                        BuildState::Failed { code } => {
                            let code = code.clone();
                            let _ = socket.close(None);
                            return Err(CliError::build(code, event.payload.message));
                        }
                        _ => {}
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        match &self.state {
            BuildState::Failed { code } => {
                Err(CliError::build(code.clone(), "build service disconnected"))
            }
            _ => {
                self.state = BuildState::Done;
                ui::display_success("Cloud build finished");
                Ok(())
            }
        }
    }

    /// Opens the TCP connection under the watchdog and completes the
    /// WebSocket handshake.
    fn connect(&self) -> Result<WebSocket<TcpStream>> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| CliError::remote_state("build server url has no host"))?;
        let port = self.url.port_or_known_default().unwrap_or(80);

        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CliError::remote_state("cannot resolve build server address"))?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|_| {
            CliError::timeout(format!(
                "cloud build service did not accept the connection within {}s",
                CONNECT_TIMEOUT.as_secs()
            ))
        })?;
        // Watchdog also covers the wait for the first event.
        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

        let (socket, _response) = tungstenite::client(self.url.as_str(), stream)
            .map_err(|e| CliError::remote_state(format!("websocket handshake failed: {}", e)))?;
        ui::display_success("Connected to cloud build service");
        Ok(socket)
    }

    fn report(&self, event: &BuildEvent) {
        match &self.state {
            BuildState::Connected { task_id } if !task_id.is_empty() => {
                ui::display_success(&format!("Cloud build task created: {}", task_id));
            }
            BuildState::Failed { code } => {
                ui::display_error(&format!("{}: {}", code, event.payload.message));
            }
            _ => {
                if !event.payload.message.is_empty() {
                    ui::display_status(&format!("{}: {}", event.action, event.payload.message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, message: &str) -> BuildEvent {
        BuildEvent {
            action: action.to_string(),
            payload: BuildPayload {
                message: message.to_string(),
            },
        }
    }

    #[test]
    fn test_failure_codes() {
        assert!(is_failure_code("build failed"));
        assert!(is_failure_code("pre-publish failed"));
        assert!(!is_failure_code("building"));
        assert!(!is_failure_code("build"));
    }

    #[test]
    fn test_connect_then_build_then_done() {
        let state = BuildState::Connecting;
        let state = apply_event(&state, &event("connect", "task-42"));
        assert_eq!(
            state,
            BuildState::Connected {
                task_id: "task-42".to_string()
            }
        );

        let state = apply_event(&state, &event("building", "compiling"));
        assert_eq!(state, BuildState::Building);

        let state = apply_event(&state, &event("disconnect", "bye"));
        assert_eq!(state, BuildState::Done);
    }

    #[test]
    fn test_failure_code_aborts_from_any_state() {
        let connected = BuildState::Connected {
            task_id: "t".to_string(),
        };
        let state = apply_event(&connected, &event("install failed", "npm install exited 1"));
        assert_eq!(
            state,
            BuildState::Failed {
                code: "install failed".to_string()
            }
        );

        let building = BuildState::Building;
        assert!(matches!(
            apply_event(&building, &event("publish failed", "")),
            BuildState::Failed { .. }
        ));
    }

    #[test]
    fn test_error_event_fails_the_session() {
        let state = apply_event(&BuildState::Building, &event("error", "boom"));
        assert_eq!(
            state,
            BuildState::Failed {
                code: "error".to_string()
            }
        );

        let connected = BuildState::Connected {
            task_id: "t".to_string(),
        };
        assert!(matches!(
            apply_event(&connected, &event("error", "lost the worker")),
            BuildState::Failed { .. }
        ));
    }

    #[test]
    fn test_first_event_error_is_not_a_task_id() {
        // A session that errors during the handshake never reaches Connected.
        let state = apply_event(&BuildState::Connecting, &event("error", "handshake refused"));
        assert_eq!(
            state,
            BuildState::Failed {
                code: "error".to_string()
            }
        );
    }

    #[test]
    fn test_first_event_disconnect_ends_the_session() {
        assert_eq!(
            apply_event(&BuildState::Connecting, &event("disconnect", "")),
            BuildState::Done
        );
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        let done = BuildState::Done;
        assert_eq!(apply_event(&done, &event("building", "late")), done);
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"action": "building", "payload": {"message": "webpack 80%"}}"#;
        let parsed: BuildEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.action, "building");
        assert_eq!(parsed.payload.message, "webpack 80%");
    }

    #[test]
    fn test_url_carries_handshake_params() {
        let params = BuildParams {
            repo: "git@github.com:demo/app.git",
            name: "app",
            branch: "dev/1.0.0",
            version: "1.0.0",
            build_cmd: "npm run build",
            prod: true,
        };
        let build = CloudBuild::new("ws://127.0.0.1:7001", &params).unwrap();
        let query = build.url.query().unwrap();
        assert!(query.contains("name=app"));
        assert!(query.contains("branch=dev%2F1.0.0"));
        assert!(query.contains("prod=true"));
    }
}
