use crate::EventEnvelope;

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be dropped and rebuilt by replaying the
/// journal, which stays the source of truth.
///
/// `apply` must be idempotent. Envelopes can arrive more than once (at-least-once
/// delivery, replays), so implementations track the last applied sequence number
/// per stream and skip anything at or below it.
pub trait Projection {
    type Payload;
    type Error: core::fmt::Debug;

    /// Apply a single committed envelope to the read model.
    fn apply(&self, envelope: &EventEnvelope<Self::Payload>) -> Result<(), Self::Error>;

    /// Drop all read-model state (rebuild support).
    fn reset(&self);

    /// Rebuild the read model from scratch by replaying envelopes.
    ///
    /// Envelopes are replayed in (stream, sequence) order regardless of input order.
    fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<Self::Payload>>,
    ) -> Result<(), Self::Error> {
        self.reset();
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.stream(), e.sequence_number()));
        for env in &envs {
            self.apply(env)?;
        }
        Ok(())
    }
}
