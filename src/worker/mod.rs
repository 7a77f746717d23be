//! The persistent worker loop: read a line, answer a line, until shutdown or end of input.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::inference::task::classify::{ClassifyHandler, ClassifyRequest, ClassifyResponse};
use crate::inference::task::generate::{GenerateHandler, GenerateRequest, GenerateResponse};
use crate::worker::protocol::{decode_line, Incoming, Reply};

pub mod protocol;

/// A transformation served over the line protocol.
pub trait LineHandler {
    type Request: DeserializeOwned;
    type Response: Serialize;

    fn handle(&mut self, request: Self::Request) -> Result<Self::Response>;
}

/// Serves a [`ClassifyHandler`] over the line protocol.
pub struct Classify<C>(pub C);

impl<C: ClassifyHandler> LineHandler for Classify<C> {
    type Request = ClassifyRequest;
    type Response = ClassifyResponse;

    fn handle(&mut self, request: ClassifyRequest) -> Result<ClassifyResponse> {
        self.0.run_classify(request)
    }
}

/// Serves a [`GenerateHandler`] over the line protocol.
pub struct Generate<G>(pub G);

impl<G: GenerateHandler> LineHandler for Generate<G> {
    type Request = GenerateRequest;
    type Response = GenerateResponse;

    fn handle(&mut self, request: GenerateRequest) -> Result<GenerateResponse> {
        self.0.run_generate(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The control signal was received and acknowledged.
    Shutdown,
    /// The input channel was closed.
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub exit: Exit,
    /// Number of replies written, not counting the shutdown acknowledgment.
    pub answered: usize,
}

/// Runs the worker loop until shutdown or end of input.
///
/// Per-line failures (undecodable input, failed inference) are answered with an
/// error reply and the loop moves on. Only I/O failures on the channel itself end
/// the loop with an error.
pub fn serve<H, R, W>(handler: &mut H, input: R, mut output: W) -> Result<Summary>
where
    H: LineHandler,
    R: BufRead,
    W: Write,
{
    let mut answered = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!("Received a line that is not valid UTF-8");
                answered += 1;
                write_reply(&mut output, &Reply::<H::Response>::error(err))?;
                continue;
            }
            Err(err) => return Err(err).context("Failed to read request line"),
        };
        if line.trim().is_empty() {
            continue;
        }

        let span = info_span!("request", seq = answered);
        let _guard = span.enter();
        let reply = match decode_line::<H::Request>(&line) {
            Ok(Incoming::Shutdown) => {
                write_reply(&mut output, &Reply::<H::Response>::ack())?;
                info!("Shutdown requested after {answered} replies");
                return Ok(Summary {
                    exit: Exit::Shutdown,
                    answered,
                });
            }
            Ok(Incoming::Request(request)) => dispatch(handler, request),
            Err(err) => {
                warn!(error = %err, "Failed to decode request");
                Reply::error(err)
            }
        };
        answered += 1;
        write_reply(&mut output, &reply)?;
    }

    info!("Input closed after {answered} replies");
    Ok(Summary {
        exit: Exit::EndOfInput,
        answered,
    })
}

fn dispatch<H: LineHandler>(handler: &mut H, request: H::Request) -> Reply<H::Response> {
    let start = std::time::Instant::now();
    match handler.handle(request) {
        Ok(response) => {
            debug!("Request handled in {:?}", start.elapsed());
            Reply::Success(response)
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Request failed");
            Reply::error(err)
        }
    }
}

fn write_reply<W: Write, T: Serialize>(output: &mut W, reply: &Reply<T>) -> Result<()> {
    serde_json::to_writer(&mut *output, reply).context("Failed to serialize reply")?;
    output.write_all(b"\n").context("Failed to write reply")?;
    output.flush().context("Failed to flush reply")?;
    Ok(())
}
