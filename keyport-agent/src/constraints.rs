//! Agent-enforced identity constraints.

use keyport_codec::wire::Writer;
use keyport_core::AgentSettings;

/// `SSH_AGENT_CONSTRAIN_LIFETIME`
const CONSTRAIN_LIFETIME: u8 = 1;
/// `SSH_AGENT_CONSTRAIN_CONFIRM`
const CONSTRAIN_CONFIRM: u8 = 2;

/// Constraints attached to an identity at add time.
///
/// Immutable value; encoded as the trailing bytes of an
/// add-identity-constrained request, confirm tag first, then the lifetime
/// tag with its big-endian second count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    /// Require per-use confirmation by the agent.
    pub require_confirmation: bool,

    /// Expire the identity after this many seconds.
    pub lifetime_seconds: Option<u32>,
}

impl ConstraintSet {
    /// No constraints — the identity is added with a plain add-identity
    /// request.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.require_confirmation && self.lifetime_seconds.is_none()
    }

    /// Append the constraint trailer to a request payload.
    pub(crate) fn encode(&self, w: &mut Writer) {
        if self.require_confirmation {
            w.put_u8(CONSTRAIN_CONFIRM);
        }
        if let Some(seconds) = self.lifetime_seconds {
            w.put_u8(CONSTRAIN_LIFETIME);
            w.put_u32(seconds);
        }
    }
}

impl From<&AgentSettings> for ConstraintSet {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            require_confirmation: settings.require_confirmation,
            lifetime_seconds: settings.lifetime_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_trailer_bytes() {
        let set = ConstraintSet {
            require_confirmation: true,
            lifetime_seconds: Some(60),
        };
        let mut w = Writer::new();
        set.encode(&mut w);
        assert_eq!(w.into_bytes(), [0x02, 0x01, 0x00, 0x00, 0x00, 0x3c]);
    }

    #[test]
    fn empty_set_encodes_nothing() {
        let mut w = Writer::new();
        ConstraintSet::none().encode(&mut w);
        assert!(w.is_empty());
        assert!(ConstraintSet::none().is_empty());
    }

    #[test]
    fn lifetime_only() {
        let set = ConstraintSet {
            require_confirmation: false,
            lifetime_seconds: Some(3600),
        };
        let mut w = Writer::new();
        set.encode(&mut w);
        assert_eq!(w.into_bytes(), [0x01, 0x00, 0x00, 0x0e, 0x10]);
    }

    #[test]
    fn from_settings_copies_constraint_fields() {
        let settings = AgentSettings {
            add_at_open: true,
            remove_at_close: false,
            require_confirmation: true,
            lifetime_seconds: Some(5),
        };
        let set = ConstraintSet::from(&settings);
        assert!(set.require_confirmation);
        assert_eq!(set.lifetime_seconds, Some(5));
    }
}
