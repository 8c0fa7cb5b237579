//! Time-bounded authority windows.
//!
//! Authority is never open-ended: a grant materializes a window whose
//! length is the base duration scaled by the T-state multiplier at grant
//! time, and every later degradation multiplies the *remaining* time by
//! the new multiplier. Windows only ever shrink after grant; recovery does
//! not give time back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PeerId;
use crate::tstate::{TState, TStateManager};

/// A pending request for authority, awaiting grant or deny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityRequest {
    /// Request id carried on the wire.
    pub id: String,
    /// Peer asking for authority.
    pub peer: PeerId,
    /// Application-defined scope of the requested authority.
    pub scope: String,
    /// Stated reason.
    pub reason: String,
    /// When the request arrived.
    pub requested_at: u64,
}

/// An active authority window. One per peer; a re-grant replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityWindow {
    /// Window id.
    pub id: String,
    /// Holder.
    pub peer: PeerId,
    /// Grant time.
    pub granted_at: u64,
    /// Expiry time; shrinks under degradation.
    pub expires_at: u64,
    /// T-state at grant time.
    pub t_state_at_grant: TState,
    /// Application-defined scope.
    pub scope: String,
    /// Optional grant conditions.
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl AuthorityWindow {
    /// Remaining time at `now`; zero once expired.
    #[must_use]
    pub const fn remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Why an authority request was not opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityDenial {
    /// The current T-state forbids new grants.
    NotAuthorizedState(TState),
    /// Grant or deny referenced an unknown request id.
    UnknownRequest,
}

impl AuthorityDenial {
    /// Short code for logs and audit entries.
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::NotAuthorizedState(_) => "NOT_AUTHORIZED_STATE",
            Self::UnknownRequest => "UNKNOWN_REQUEST",
        }
    }
}

/// Owns all pending requests and active windows.
#[derive(Debug)]
pub struct AuthorityManager {
    pending: HashMap<String, AuthorityRequest>,
    windows: HashMap<PeerId, AuthorityWindow>,
    base_duration_ms: u64,
}

impl AuthorityManager {
    /// Creates a manager with the given T0 base duration.
    #[must_use]
    pub fn new(base_duration_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            windows: HashMap::new(),
            base_duration_ms,
        }
    }

    /// Opens a request for authority.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityDenial::NotAuthorizedState`] when the current
    /// T-state forbids new grants; the request is not stored.
    pub fn request(
        &mut self,
        peer: &PeerId,
        scope: &str,
        reason: &str,
        tstate: &TStateManager,
        now: u64,
    ) -> Result<String, AuthorityDenial> {
        let id = Uuid::new_v4().to_string();
        self.register_request(&id, peer, scope, reason, tstate, now)?;
        Ok(id)
    }

    /// Opens a request under a caller-supplied id (wire requests carry
    /// their own).
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityDenial::NotAuthorizedState`] when the current
    /// T-state forbids new grants; the request is not stored.
    pub fn register_request(
        &mut self,
        id: &str,
        peer: &PeerId,
        scope: &str,
        reason: &str,
        tstate: &TStateManager,
        now: u64,
    ) -> Result<(), AuthorityDenial> {
        if !tstate.can_grant_new_authority() {
            tracing::debug!(
                peer = %peer,
                state = tstate.state().as_str(),
                "authority request refused by t-state"
            );
            return Err(AuthorityDenial::NotAuthorizedState(tstate.state()));
        }
        self.pending.insert(
            id.to_owned(),
            AuthorityRequest {
                id: id.to_owned(),
                peer: peer.clone(),
                scope: scope.to_owned(),
                reason: reason.to_owned(),
                requested_at: now,
            },
        );
        Ok(())
    }

    /// Materializes a window for a pending request.
    ///
    /// The duration is `base · multiplier(current T-state)`. Any existing
    /// window for the peer is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityDenial::UnknownRequest`] on a stale or unknown
    /// id, and [`AuthorityDenial::NotAuthorizedState`] if the T-state
    /// degraded past granting between request and grant.
    pub fn grant(
        &mut self,
        request_id: &str,
        tstate: &TStateManager,
        now: u64,
    ) -> Result<AuthorityWindow, AuthorityDenial> {
        if !tstate.can_grant_new_authority() {
            return Err(AuthorityDenial::NotAuthorizedState(tstate.state()));
        }
        let request = self
            .pending
            .remove(request_id)
            .ok_or(AuthorityDenial::UnknownRequest)?;

        let state = tstate.state();
        let duration = scale_duration(self.base_duration_ms, state.multiplier());
        let window = AuthorityWindow {
            id: Uuid::new_v4().to_string(),
            peer: request.peer.clone(),
            granted_at: now,
            expires_at: now.saturating_add(duration),
            t_state_at_grant: state,
            scope: request.scope,
            conditions: Vec::new(),
        };
        tracing::info!(
            peer = %window.peer,
            scope = %window.scope,
            duration_ms = duration,
            state = state.as_str(),
            "authority granted"
        );
        self.windows.insert(request.peer, window.clone());
        Ok(window)
    }

    /// Drops a pending request.
    ///
    /// Returns the dropped request, or `None` for unknown ids.
    pub fn deny(&mut self, request_id: &str) -> Option<AuthorityRequest> {
        self.pending.remove(request_id)
    }

    /// Removes a peer's window.
    ///
    /// Returns the removed window; the caller quarantines and records the
    /// violation, in that order.
    pub fn revoke(&mut self, peer: &PeerId, reason: &str) -> Option<AuthorityWindow> {
        let window = self.windows.remove(peer);
        if window.is_some() {
            tracing::warn!(peer = %peer, reason, "authority revoked");
        }
        window
    }

    /// Removes and returns every expired window.
    pub fn check_expirations(&mut self, now: u64) -> Vec<AuthorityWindow> {
        let expired: Vec<PeerId> = self
            .windows
            .values()
            .filter(|w| w.expires_at <= now)
            .map(|w| w.peer.clone())
            .collect();
        let mut removed: Vec<AuthorityWindow> = expired
            .iter()
            .filter_map(|peer| self.windows.remove(peer))
            .collect();
        removed.sort_by(|a, b| a.peer.cmp(&b.peer));
        removed
    }

    /// Rescales every remaining window after a T-state transition.
    ///
    /// Each window's remaining time is multiplied by the new state's
    /// multiplier. Transitions compound; a window never regains time.
    pub fn shrink_windows(&mut self, new_state: TState, now: u64) {
        let multiplier = new_state.multiplier();
        for window in self.windows.values_mut() {
            let remaining = window.expires_at.saturating_sub(now);
            let scaled = scale_duration(remaining, multiplier);
            let next_expiry = now.saturating_add(scaled);
            if next_expiry < window.expires_at {
                tracing::debug!(
                    peer = %window.peer,
                    remaining_ms = remaining,
                    scaled_ms = scaled,
                    state = new_state.as_str(),
                    "authority window shrunk"
                );
                window.expires_at = next_expiry;
            }
        }
    }

    /// Whether a peer holds unexpired authority at `now`.
    #[must_use]
    pub fn has_authority(&self, peer: &PeerId, now: u64) -> bool {
        self.windows
            .get(peer)
            .is_some_and(|w| w.expires_at > now)
    }

    /// Active window for a peer, if any.
    #[must_use]
    pub fn window(&self, peer: &PeerId) -> Option<&AuthorityWindow> {
        self.windows.get(peer)
    }

    /// Pending request by id, if any.
    #[must_use]
    pub fn pending(&self, request_id: &str) -> Option<&AuthorityRequest> {
        self.pending.get(request_id)
    }

    /// Number of active windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no windows are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "durations are far below 2^52 ms; the product stays exact enough"
)]
fn scale_duration(duration_ms: u64, multiplier: f64) -> u64 {
    (duration_ms as f64 * multiplier).round() as u64
}
