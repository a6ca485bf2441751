//! Observable request phase of a chat session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Where a session is in its request cycle.
///
/// `Idle → AwaitingEmbedding → AwaitingRetrieval → AwaitingGeneration → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingEmbedding,
    AwaitingRetrieval,
    AwaitingGeneration,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::AwaitingEmbedding,
            2 => Self::AwaitingRetrieval,
            3 => Self::AwaitingGeneration,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::AwaitingEmbedding => 1,
            Self::AwaitingRetrieval => 2,
            Self::AwaitingGeneration => 3,
        }
    }
}

/// A cloneable, lock-free view of a session's phase.
///
/// Readers never wait for the session's request lock, so the phase can be
/// observed while a request is in flight.
#[derive(Debug, Clone, Default)]
pub struct PhaseHandle(Arc<AtomicU8>);

impl PhaseHandle {
    pub fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: SessionPhase) {
        self.0.store(phase.as_u8(), Ordering::Release);
    }

    /// Leave `Idle` for `phase`; the returned guard restores `Idle` when dropped.
    pub(crate) fn enter(&self, phase: SessionPhase) -> PhaseGuard<'_> {
        self.set(phase);
        PhaseGuard { handle: self }
    }
}

/// Returns the session to [`SessionPhase::Idle`] on success, error or
/// cancellation of the request future.
pub(crate) struct PhaseGuard<'a> {
    handle: &'a PhaseHandle,
}

impl PhaseGuard<'_> {
    pub(crate) fn advance(&self, phase: SessionPhase) {
        self.handle.set(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.handle.set(SessionPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_idle() {
        let handle = PhaseHandle::default();
        assert_eq!(handle.get(), SessionPhase::Idle);
        {
            let guard = handle.enter(SessionPhase::AwaitingEmbedding);
            let observer = handle.clone();
            assert_eq!(observer.get(), SessionPhase::AwaitingEmbedding);
            guard.advance(SessionPhase::AwaitingGeneration);
            assert_eq!(observer.get(), SessionPhase::AwaitingGeneration);
        }
        assert_eq!(handle.get(), SessionPhase::Idle);
    }
}
