//! Streaming chat session manager.
//!
//! Owns the session lifecycle, the transcript, and the per-turn chunk stream.
//! One instance is constructed at startup and threaded through to whichever
//! component drives the input loop; there is no ambient singleton.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::Path;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::core::backend::{BackendHandle, ChatBackend, ChunkStream};
use crate::core::transcript::{Transcript, Turn};

/// Chunk emitted when a send is attempted before the session is Ready.
pub const NOT_READY_CHUNK: &str = "Error: model not initialized";

/// Session lifecycle. `Ready` is the only state that accepts sends; `Failed`
/// is sticky until the caller re-invokes initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// I/O failure while persisting the transcript. Never escalates further; the
/// message is also recorded on the session for display.
#[derive(Debug, Clone)]
pub struct PersistenceError {
    message: String,
}

impl PersistenceError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PersistenceError {}

pub struct SessionManager<B: ChatBackend> {
    backend: B,
    requested_model: String,
    handle: Option<BackendHandle>,
    model_id: Option<String>,
    state: SessionState,
    last_error: Option<String>,
    transcript: Transcript,
}

struct TurnInFlight<'a, B: ChatBackend> {
    session: &'a mut SessionManager<B>,
    inner: ChunkStream,
    buffer: String,
    done: bool,
}

impl<B: ChatBackend> SessionManager<B> {
    pub fn new(backend: B, model: impl Into<String>) -> Self {
        Self {
            backend,
            requested_model: model.into(),
            handle: None,
            model_id: None,
            state: SessionState::Uninitialized,
            last_error: None,
            transcript: Transcript::new(),
        }
    }

    /// Connect to the backend and resolve the model. Idempotent after
    /// success; a failed attempt must be retried explicitly by calling this
    /// again. Always returns a status string, never an error.
    pub async fn initialize(&mut self) -> String {
        if self.state == SessionState::Ready {
            return "Ready".to_string();
        }

        self.state = SessionState::Initializing;
        match self.connect().await {
            Ok(model_id) => {
                self.state = SessionState::Ready;
                self.last_error = None;
                format!("Model {model_id} initialized")
            }
            Err(e) => {
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                format!("Error initializing model: {e}")
            }
        }
    }

    async fn connect(&mut self) -> Result<String, crate::core::backend::BackendError> {
        let mut handle = self.backend.start_and_connect(&self.requested_model).await?;
        let model_id = self.backend.resolve_model_info(&handle).await?;
        handle.model = model_id.clone();
        self.handle = Some(handle);
        self.model_id = Some(model_id.clone());
        Ok(model_id)
    }

    /// Run one chat turn as a finite stream of text chunks.
    ///
    /// Outside `Ready` the stream yields exactly one error-marker chunk and
    /// no turns are recorded. Otherwise the user turn is recorded before the
    /// backend call, every non-empty chunk is forwarded in arrival order, and
    /// the assistant turn is recorded after the stream ends, only if the
    /// accumulated content is non-empty. Backend errors mid-stream become one
    /// final error-marker chunk; no assistant turn is recorded for a partial
    /// buffer.
    ///
    /// The returned stream holds the exclusive borrow of the session, so a
    /// second send cannot start while a turn is in flight.
    pub fn send_message(&mut self, text: &str) -> BoxStream<'_, String> {
        let handle = match (self.state, &self.handle) {
            (SessionState::Ready, Some(handle)) => handle.clone(),
            _ => {
                debug!(state = ?self.state, "send rejected: session not ready");
                return stream::iter(vec![NOT_READY_CHUNK.to_string()]).boxed();
            }
        };

        self.transcript.append(Turn::user(text));
        let inner = self.backend.stream_chat(&handle, text);
        debug!(model = %handle.model, "turn stream opened");

        let turn = TurnInFlight {
            session: self,
            inner,
            buffer: String::new(),
            done: false,
        };

        stream::unfold(turn, |mut turn| async move {
            if turn.done {
                return None;
            }
            loop {
                match turn.inner.next().await {
                    Some(Ok(chunk)) => {
                        if chunk.is_empty() {
                            continue;
                        }
                        turn.buffer.push_str(&chunk);
                        return Some((chunk, turn));
                    }
                    Some(Err(e)) => {
                        turn.done = true;
                        turn.session.last_error = Some(e.to_string());
                        debug!("turn stream failed: {e}");
                        return Some((format!("Error: {e}"), turn));
                    }
                    None => {
                        turn.done = true;
                        if !turn.buffer.is_empty() {
                            let content = mem::take(&mut turn.buffer);
                            turn.session.transcript.append(Turn::assistant(content));
                        }
                        debug!("turn stream completed");
                        return None;
                    }
                }
            }
        })
        .boxed()
    }

    /// Drop all recorded turns. Session state is untouched.
    pub fn clear_history(&mut self) {
        self.transcript.clear();
    }

    /// Snapshot the transcript to a plain-text file, one line per turn.
    pub fn save_conversation(&mut self, path: &Path) -> Result<(), PersistenceError> {
        match write_lines(path, &self.transcript.serialize_lines()) {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = format!("could not save transcript to {}: {e}", path.display());
                self.last_error = Some(message.clone());
                Err(PersistenceError::new(message))
            }
        }
    }

    /// Point-in-time turn counts as display text.
    pub fn summary(&self) -> String {
        let s = self.transcript.summary();
        format!(
            "{} turns total ({} user, {} assistant)",
            s.total, s.user, s.assistant
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The concrete model id after a successful initialize.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Last recorded error message; overwritten by the next successful
    /// initialize.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}
