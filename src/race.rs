//! First-success race over catalog candidates.
//!
//! Every candidate is resolved concurrently. The first URL to land in a
//! single-slot channel wins; the remaining attempts are cancelled and
//! aborted. The channel closes once every attempt has dropped its sender,
//! which is how "all candidates failed" is detected without polling.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::delivery::CandidateResolver;
use crate::error::ResolveError;
use crate::types::Candidate;

pub struct RaceCoordinator<R: ?Sized> {
    resolver: Arc<R>,
}

impl<R: ?Sized> Clone for RaceCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
        }
    }
}

impl<R> RaceCoordinator<R>
where
    R: CandidateResolver + ?Sized + 'static,
{
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }

    /// Resolve all candidates concurrently and return the first URL.
    ///
    /// Only ever fails with `NotFound` (nothing to try, or every attempt
    /// failed) or `Cancelled` (`ctx` fired first). Per-candidate upstream
    /// errors are logged and swallowed.
    pub async fn race_first_success(
        &self,
        ctx: &CancellationToken,
        candidates: Vec<Candidate>,
    ) -> Result<String, ResolveError> {
        if candidates.is_empty() {
            return Err(ResolveError::NotFound("no candidates to resolve".to_string()));
        }
        if ctx.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let race = ctx.child_token();
        let _cancel_on_exit = race.clone().drop_guard();
        let (winner_tx, mut winner_rx) = mpsc::channel::<String>(1);

        let mut attempts = JoinSet::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            let span = info_span!("attempt", track_id = candidate.id, attempt = index + 1);
            attempts.spawn(
                attempt(
                    self.resolver.clone(),
                    race.clone(),
                    winner_tx.clone(),
                    candidate,
                )
                .instrument(span),
            );
        }
        // Only the attempts hold senders now.
        drop(winner_tx);

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                warn!("Operation cancelled before a result was found");
                Err(ResolveError::Cancelled)
            }
            winner = winner_rx.recv() => match winner {
                Some(url) => {
                    race.cancel();
                    Ok(url)
                }
                None => {
                    warn!("Processed all search results but found no valid track URL");
                    Err(ResolveError::NotFound(
                        "no candidate yielded a playable URL".to_string(),
                    ))
                }
            },
        };

        // Losers are aborted rather than awaited.
        attempts.abort_all();
        outcome
    }
}

async fn attempt<R>(
    resolver: Arc<R>,
    cancel: CancellationToken,
    winner: mpsc::Sender<String>,
    candidate: Candidate,
) where
    R: CandidateResolver + ?Sized,
{
    if cancel.is_cancelled() {
        return;
    }

    match resolver.resolve(&cancel, &candidate).await {
        Ok(url) => {
            // Losing this to cancellation means another attempt already won.
            tokio::select! {
                _ = winner.send(url) => {}
                _ = cancel.cancelled() => {}
            }
        }
        Err(ResolveError::NotFound(reason)) => {
            warn!(%reason, "Track details not found, attempt exits");
        }
        Err(ResolveError::Cancelled) => {
            debug!("Attempt cancelled");
        }
        Err(err) => {
            error!(error = %err, "Unexpected error getting track URL");
        }
    }
}
