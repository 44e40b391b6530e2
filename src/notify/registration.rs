use core::sync::atomic::{AtomicU32, Ordering};

/// Process id of a client that asked to be notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u32);

/// The client currently registered for notification, if any.
///
/// Lock-free so the timer callback can read it without blocking. Id 0 is
/// reserved for "nobody".
#[derive(Default)]
pub struct ClientRegistration {
    pid: AtomicU32,
}

impl ClientRegistration {
    const NONE: u32 = 0;

    /// Creates an empty registration.
    pub const fn new() -> Self {
        Self {
            pid: AtomicU32::new(Self::NONE),
        }
    }

    /// Records `client`, replacing any previous one.
    ///
    /// Returns the client that was replaced.
    pub fn register(&self, client: ClientId) -> Option<ClientId> {
        debug_assert_ne!(client.0, Self::NONE);
        Self::decode(self.pid.swap(client.0, Ordering::AcqRel))
    }

    /// Clears the registration.
    pub fn clear(&self) -> Option<ClientId> {
        Self::decode(self.pid.swap(Self::NONE, Ordering::AcqRel))
    }

    /// The registered client.
    #[inline]
    pub fn get(&self) -> Option<ClientId> {
        Self::decode(self.pid.load(Ordering::Acquire))
    }

    #[inline]
    fn decode(raw: u32) -> Option<ClientId> {
        (raw != Self::NONE).then_some(ClientId(raw))
    }
}

impl core::fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ClientRegistration").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_replace_and_clear() {
        let reg = ClientRegistration::new();
        assert_eq!(reg.get(), None);

        assert_eq!(reg.register(ClientId(100)), None);
        assert_eq!(reg.get(), Some(ClientId(100)));

        assert_eq!(reg.register(ClientId(200)), Some(ClientId(100)));
        assert_eq!(reg.get(), Some(ClientId(200)));

        assert_eq!(reg.clear(), Some(ClientId(200)));
        assert_eq!(reg.get(), None);
    }
}
