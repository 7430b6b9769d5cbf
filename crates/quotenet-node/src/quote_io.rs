//! Console quote loops.
//!
//! [`run_send_loop`] prompts for a pair and a price, reads one line for
//! each and publishes the encoded quote. [`run_receive_loop`] drains a
//! subscription and prints every valid quote as the sending peer's id
//! followed by `pair: price`. The loops are independent; both stop on
//! the shutdown signal, and neither treats a single bad message or a
//! failed publish as fatal.

use std::future::Future;

use futures::{Stream, StreamExt};
use quotenet_protocol::codec;
use quotenet_protocol::quote::PriceQuote;
use quotenet_types::{QuotenetError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::pubsub::{InboundMessage, Topic};

pub const PAIR_PROMPT: &str = "Enter pair: ";
pub const PRICE_PROMPT: &str = "Enter price: ";

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Something quotes can be published to.
pub trait Publisher {
    fn publish_quote(&self, quote: &PriceQuote) -> impl Future<Output = Result<()>> + Send;
}

impl Publisher for Topic {
    async fn publish_quote(&self, quote: &PriceQuote) -> Result<()> {
        Topic::publish_quote(self, quote).await
    }
}

// ---------------------------------------------------------------------------
// Send loop
// ---------------------------------------------------------------------------

/// Outcome counters of a finished send loop.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SendReport {
    pub published: usize,
    pub failed: usize,
}

/// Reads pair/price pairs from `input` until end of input or shutdown.
///
/// Publish failures (typically no peer on the topic yet) are logged
/// and the loop moves on to the next quote.
///
/// # Errors
///
/// `QuotenetError::NodeError` if reading input or writing a prompt
/// fails.
pub async fn run_send_loop<R, W, P>(
    mut input: R,
    mut prompt: W,
    publisher: &P,
    mut shutdown: watch::Receiver<bool>,
) -> Result<SendReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    P: Publisher,
{
    let mut report = SendReport::default();

    loop {
        write_text(&mut prompt, PAIR_PROMPT).await?;
        let Some(pair) = next_line(&mut input, &mut shutdown).await? else {
            break;
        };
        write_text(&mut prompt, PRICE_PROMPT).await?;
        let Some(price) = next_line(&mut input, &mut shutdown).await? else {
            break;
        };

        let quote = PriceQuote::new(pair, price);
        match publisher.publish_quote(&quote).await {
            Ok(()) => {
                report.published += 1;
                tracing::debug!(%quote, "quote published");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(%e, %quote, "failed to publish quote");
            }
        }
    }

    tracing::info!(
        published = report.published,
        failed = report.failed,
        "send loop stopped"
    );
    Ok(report)
}

/// Next input line without its line ending. `None` on end of input or
/// shutdown.
async fn next_line<R>(input: &mut R, shutdown: &mut watch::Receiver<bool>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    if *shutdown.borrow() {
        return Ok(None);
    }

    let mut line = String::new();
    let read = tokio::select! {
        read = input.read_line(&mut line) => read.map_err(|e| QuotenetError::NodeError {
            reason: format!("failed to read input: {e}"),
        })?,
        Ok(()) = shutdown.changed() => return Ok(None),
    };
    if read == 0 {
        return Ok(None);
    }

    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    Ok(Some(trimmed.to_string()))
}

async fn write_text<W>(out: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes())
        .await
        .map_err(|e| QuotenetError::NodeError {
            reason: format!("failed to write output: {e}"),
        })?;
    out.flush().await.map_err(|e| QuotenetError::NodeError {
        reason: format!("failed to flush output: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Outcome counters of a finished receive loop.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReceiveReport {
    pub delivered: usize,
    pub malformed: usize,
}

/// Prints every decodable message from `messages` to `output` until
/// the stream ends or shutdown is signalled. Malformed payloads are
/// logged and skipped.
///
/// # Errors
///
/// `QuotenetError::NodeError` if writing to `output` fails.
pub async fn run_receive_loop<S, W>(
    mut messages: S,
    mut output: W,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ReceiveReport>
where
    S: Stream<Item = InboundMessage> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut report = ReceiveReport::default();

    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = tokio::select! {
            next = messages.next() => next,
            Ok(()) = shutdown.changed() => break,
        };
        let Some(message) = next else {
            tracing::info!("subscription ended");
            break;
        };

        match codec::decode(&message.data) {
            Ok(quote) => {
                write_text(&mut output, &format!("{}\n{}\n", message.source, quote)).await?;
                report.delivered += 1;
            }
            Err(e) => {
                report.malformed += 1;
                tracing::warn!(source = %message.source, %e, "dropping malformed quote");
            }
        }
    }

    tracing::info!(
        delivered = report.delivered,
        malformed = report.malformed,
        "receive loop stopped"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
