//! The conversation loop: read a prompt, ground it, ask the model, record
//! the answer, until the user quits or something fails.

use std::io::{BufRead, Write};

use tracing::{debug, error, info, instrument};

use crate::chat::{ChatBackend, ChatRequest};
use crate::config::Settings;
use crate::console::Console;
use crate::constants;
use crate::error::Result;
use crate::registry::SearchConnection;
use crate::retrieval::RetrievalDirective;
use crate::Transcript;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The user typed the sentinel, or input ran out.
    Quit,
    /// A remote call or console operation failed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    /// The newest transcript turn is a user turn waiting for its answer.
    AwaitingResponse,
    Terminated(Termination),
}

/// What the loop needs from the resolved settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub index_name: String,
    pub system_prompt: String,
    pub show_citations: bool,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            model: settings.model_deployment.clone(),
            index_name: settings.index_name.clone(),
            system_prompt: settings.system_prompt.clone(),
            show_citations: settings.show_citations,
        }
    }
}

pub fn is_quit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(constants::QUIT_SENTINEL)
}

pub struct Session<B, R, W> {
    config: SessionConfig,
    search: SearchConnection,
    backend: B,
    console: Console<R, W>,
    transcript: Transcript,
    state: SessionState,
}

impl<B, R, W> Session<B, R, W>
where
    B: ChatBackend,
    R: BufRead,
    W: Write,
{
    pub fn new(
        config: SessionConfig,
        search: SearchConnection,
        backend: B,
        console: Console<R, W>,
    ) -> Self {
        let transcript = Transcript::new(config.system_prompt.clone());
        Self {
            config,
            search,
            backend,
            console,
            transcript,
            state: SessionState::AwaitingInput,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_parts(self) -> (Transcript, Console<R, W>) {
        (self.transcript, self.console)
    }

    /// Drives [`Session::step`] until the session terminates. Returns
    /// `Ok(Termination::Quit)` on a clean exit; any failure is returned as
    /// the error, leaving the transcript as it was when the failure hit.
    pub async fn run(&mut self) -> Result<Termination> {
        info!(model = %self.config.model, index = %self.config.index_name, "Chat session started");
        loop {
            if let SessionState::Terminated(reason) = self.step().await? {
                info!(turns = self.transcript.len(), "Chat session finished");
                return Ok(reason);
            }
        }
    }

    /// Performs exactly one state transition and returns the new state.
    pub async fn step(&mut self) -> Result<SessionState> {
        let result = match self.state {
            SessionState::AwaitingInput => self.read_input(),
            SessionState::AwaitingResponse => self.respond().await,
            SessionState::Terminated(_) => Ok(self.state),
        };

        match result {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                error!(error = %e, "Chat session failed");
                self.state = SessionState::Terminated(Termination::Failed);
                Err(e)
            }
        }
    }

    fn read_input(&mut self) -> Result<SessionState> {
        let Some(input) = self.console.read_line(constants::INPUT_PROMPT)? else {
            debug!("End of input");
            return Ok(SessionState::Terminated(Termination::Quit));
        };

        if is_quit(&input) {
            return Ok(SessionState::Terminated(Termination::Quit));
        }
        if input.is_empty() {
            self.console.notice(constants::EMPTY_INPUT_NOTICE)?;
            return Ok(SessionState::AwaitingInput);
        }

        self.transcript.push_user(input);
        Ok(SessionState::AwaitingResponse)
    }

    #[instrument(skip(self), fields(turns = self.transcript.len()))]
    async fn respond(&mut self) -> Result<SessionState> {
        let directive = RetrievalDirective::from_connection(&self.search, &self.config.index_name);
        let request = ChatRequest {
            model: &self.config.model,
            messages: self.transcript.turns(),
            data_sources: vec![directive],
        };

        let reply = self.backend.complete(&request).await?;
        self.console.reply(&reply, self.config.show_citations)?;
        self.transcript.push_assistant(reply.content);
        Ok(SessionState::AwaitingInput)
    }
}
