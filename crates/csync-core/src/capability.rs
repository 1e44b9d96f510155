#![forbid(unsafe_code)]

//! Connector capability flags.
//!
//! The engine never asks "what class is this connector"; it asks which
//! capabilities the connector advertises and dispatches on those.

use bitflags::bitflags;

bitflags! {
    /// What a connector can do, as seen by the synchronization engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        /// A visible UI component (as opposed to an extension or helper).
        const COMPONENT             = 1 << 0;
        /// The root of a connector tree.
        const ROOT                  = 1 << 1;
        /// Carries shared state synchronized to the client.
        const HAS_STATE             = 1 << 2;
        /// May have child connectors.
        const HAS_CHILDREN          = 1 << 3;
        /// Decides per child whether it is rendered (tabs, accordions).
        const VISIBILITY_CONTROLLED = 1 << 4;
        /// Accepts legacy variable changes.
        const VARIABLE_OWNER        = 1 << 5;
        /// Produces legacy paint output.
        const LEGACY_PAINT          = 1 << 6;
        /// Accepts server RPC calls.
        const RPC_TARGET            = 1 << 7;
        /// Handles errors raised by its own invocations.
        const ERROR_HANDLER         = 1 << 8;
    }
}

impl Capabilities {
    /// Typical capability set of a stateful leaf component.
    pub const LEAF_COMPONENT: Self = Self::COMPONENT.union(Self::HAS_STATE);

    /// Typical capability set of a stateful container component.
    pub const CONTAINER: Self = Self::LEAF_COMPONENT.union(Self::HAS_CHILDREN);
}
