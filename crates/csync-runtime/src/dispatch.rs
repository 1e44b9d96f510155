#![forbid(unsafe_code)]

//! Executes decoded invocations against the connector tree and routes the
//! errors their handlers report.
//!
//! # Invariants
//!
//! 1. **Enabled set fixed up front**: whether a connector may receive
//!    invocations is decided once per burst, before the first handler runs,
//!    so a handler that disables its neighbour does not change how the rest
//!    of the burst is delivered.
//! 2. **Close always delivered**: a legacy invocation whose only change is
//!    `close = true` reaches its connector even when disabled.
//! 3. **Errors never abort**: a failing handler is routed and the burst
//!    continues with the next invocation.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Rejected entry | Decoder could not resolve it | Skipped with `warn!` |
//! | Variable change to a non-owner | Client sent `v` to the wrong connector | Skipped, session handler told |
//! | Missing connector | Client out of sync | Skipped, burst marked inconsistent |
//! | Disabled connector | Stale client UI | Dropped with `warn!` (type, caption) |
//! | Handler `Err` | Application bug | Connector `handle_error`, then session handler |

use ahash::AHashSet;
use csync_core::{
    Capabilities, ConnectorId, ConnectorTracker, ErrorEvent, ErrorHandler, ErrorOrigin,
    HandlerError, MethodInvocation,
};

use crate::decode::Decoded;

/// What happened to one burst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub dispatched: usize,
    pub dropped: usize,
    pub rejected: usize,
    /// An invocation addressed a connector the tree does not have.
    pub inconsistent: bool,
}

/// Run `invocations` in order.
pub fn dispatch_burst(
    tracker: &mut ConnectorTracker,
    invocations: Vec<Decoded>,
    errors: &dyn ErrorHandler,
) -> DispatchOutcome {
    let enabled: AHashSet<ConnectorId> = invocations
        .iter()
        .filter_map(|decoded| match decoded {
            Decoded::Invocation(invocation) => Some(invocation.connector_id()),
            Decoded::Rejected(_) => None,
        })
        .filter(|id| tracker.is_connector_enabled(id))
        .cloned()
        .collect();

    let mut outcome = DispatchOutcome::default();
    for decoded in invocations {
        let invocation = match decoded {
            Decoded::Invocation(invocation) => invocation,
            Decoded::Rejected(err) => {
                tracing::warn!(%err, "ignoring invocation");
                outcome.rejected += 1;
                outcome.inconsistent |= err.is_unknown_connector();
                if err.is_reported() {
                    let event = ErrorEvent::new(
                        ErrorOrigin::Invocation,
                        Some(err.connector().clone()),
                        HandlerError::with_source(err.to_string(), err),
                    );
                    errors.error(&event);
                }
                continue;
            }
        };

        let id = invocation.connector_id().clone();
        let Some(connector) = tracker.get(&id) else {
            tracing::warn!(
                connector = %id,
                interface = invocation.interface_name(),
                method = invocation.method_name(),
                "invocation for a connector that is no longer attached"
            );
            outcome.inconsistent = true;
            outcome.rejected += 1;
            continue;
        };

        let close_signal = invocation
            .as_legacy()
            .is_some_and(|legacy| legacy.is_close_signal());
        if !enabled.contains(&id) && !close_signal {
            tracing::warn!(
                connector = %id,
                connector_type = connector.connector_type().name(),
                caption = connector.caption().unwrap_or(""),
                interface = invocation.interface_name(),
                method = invocation.method_name(),
                "ignoring invocation for disabled connector"
            );
            outcome.dropped += 1;
            continue;
        }

        let result = match &invocation {
            MethodInvocation::Legacy(legacy) => {
                tracker.with_connector(&id, |c, ctx| c.change_variables(&legacy.changes, ctx))
            }
            MethodInvocation::Rpc(call) => {
                tracker.with_connector(&id, |c, ctx| c.invoke_rpc(call, ctx))
            }
        };
        outcome.dispatched += 1;

        if let Some(Err(error)) = result {
            let mut event = ErrorEvent::new(ErrorOrigin::Invocation, Some(id), error);
            if let MethodInvocation::Legacy(legacy) = invocation {
                event = event.with_variables(legacy.changes);
            }
            route_error(tracker, errors, event);
        }
    }
    outcome
}

/// Offer `event` to its connector's own handler, then to the session
/// handler if still unhandled.
///
/// A connector handler that itself fails is reported to the session handler
/// as an [`ErrorOrigin::ErrorHandler`] event before the original event.
pub fn route_error(tracker: &mut ConnectorTracker, errors: &dyn ErrorHandler, event: ErrorEvent) {
    let handled = match &event.connector {
        Some(id) => match tracker.get_mut(id) {
            Some(connector) if connector.capabilities().contains(Capabilities::ERROR_HANDLER) => {
                match connector.handle_error(&event) {
                    Ok(handled) => handled,
                    Err(failure) => {
                        let nested = ErrorEvent::new(
                            ErrorOrigin::ErrorHandler,
                            Some(id.clone()),
                            HandlerError::with_source(
                                format!("error handler of {id} failed"),
                                failure,
                            ),
                        );
                        errors.error(&nested);
                        false
                    }
                }
            }
            _ => false,
        },
        None => false,
    };
    if !handled {
        errors.error(&event);
    }
}
