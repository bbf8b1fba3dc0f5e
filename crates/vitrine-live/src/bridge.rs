//! Visual editing bridge.
//!
//! Lifecycle `Unmounted -> Mounted -> EditingEnabled`, forward only. The
//! bridge only mounts in a browser context, and overlays are activated for
//! editor sessions at most once.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info};

use vitrine_core::{EditingModeSignal, Error, ExecutionContext, Result};

/// Turns on the in-place editing overlays.
pub trait OverlayActivator: Send + Sync {
    /// Activates the overlays. Called at most once per bridge.
    fn activate(&self) -> Result<()>;
}

impl<F> OverlayActivator for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn activate(&self) -> Result<()> {
        self()
    }
}

/// Where the bridge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// Not attached yet.
    Unmounted = 0,
    /// Attached to the browser document.
    Mounted = 1,
    /// Overlays active.
    EditingEnabled = 2,
}

impl BridgeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unmounted,
            1 => Self::Mounted,
            _ => Self::EditingEnabled,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmounted => f.write_str("unmounted"),
            Self::Mounted => f.write_str("mounted"),
            Self::EditingEnabled => f.write_str("editing enabled"),
        }
    }
}

/// Client-side bootstrap for editing overlays.
pub struct VisualEditingBridge<A> {
    context: ExecutionContext,
    signal: EditingModeSignal,
    activator: A,
    state: AtomicU8,
}

impl<A: OverlayActivator> VisualEditingBridge<A> {
    /// Creates an unmounted bridge.
    pub fn new(context: ExecutionContext, signal: EditingModeSignal, activator: A) -> Self {
        Self {
            context,
            signal,
            activator,
            state: AtomicU8::new(BridgeState::Unmounted as u8),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether overlays are active.
    pub fn is_editing(&self) -> bool {
        self.state() == BridgeState::EditingEnabled
    }

    /// The overlay activator.
    pub fn activator(&self) -> &A {
        &self.activator
    }

    /// Attaches the bridge. Mounting again is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::EnvironmentViolation`] in the server context.
    pub fn mount(&self) -> Result<()> {
        self.context.ensure_client("mounting the visual editing bridge")?;
        match self.state.compare_exchange(
            BridgeState::Unmounted as u8,
            BridgeState::Mounted as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => debug!("visual editing bridge mounted"),
            Err(current) => debug!(state = %BridgeState::from_u8(current), "bridge already mounted"),
        }
        Ok(())
    }

    /// Enables editing overlays.
    ///
    /// Returns `true` only for the call that activated them. Without an
    /// active editing-mode signal the bridge stays mounted and returns
    /// `false`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] before [`VisualEditingBridge::mount`].
    /// - Whatever the activator returns; the bridge then stays mounted.
    pub fn enable(&self) -> Result<bool> {
        match self.state() {
            BridgeState::Unmounted => {
                return Err(Error::invalid_state(
                    "visual editing bridge must be mounted before enabling",
                ));
            }
            BridgeState::EditingEnabled => return Ok(false),
            BridgeState::Mounted => {}
        }

        if !self.signal.is_active() {
            debug!("editing mode inactive, overlays stay off");
            return Ok(false);
        }

        if self
            .state
            .compare_exchange(
                BridgeState::Mounted as u8,
                BridgeState::EditingEnabled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(false);
        }

        if let Err(err) = self.activator.activate() {
            self.state
                .store(BridgeState::Mounted as u8, Ordering::Release);
            return Err(err);
        }
        info!("visual editing enabled");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl OverlayActivator for Counting {
        fn activate(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Counting {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn editor_bridge() -> VisualEditingBridge<Counting> {
        VisualEditingBridge::new(
            ExecutionContext::Client,
            EditingModeSignal::active(),
            Counting::default(),
        )
    }

    #[test]
    fn test_lifecycle() {
        let bridge = editor_bridge();
        assert_eq!(bridge.state(), BridgeState::Unmounted);

        assert_ok!(bridge.mount());
        assert_eq!(bridge.state(), BridgeState::Mounted);

        assert!(bridge.enable().unwrap());
        assert_eq!(bridge.state(), BridgeState::EditingEnabled);
        assert!(bridge.is_editing());
    }

    #[test]
    fn test_enable_twice_activates_once() {
        let bridge = editor_bridge();
        bridge.mount().unwrap();
        assert!(bridge.enable().unwrap());
        assert!(!bridge.enable().unwrap());
        assert_eq!(bridge.activator().calls(), 1);
    }

    #[test]
    fn test_mount_twice_is_noop() {
        let bridge = editor_bridge();
        bridge.mount().unwrap();
        bridge.enable().unwrap();
        assert_ok!(bridge.mount());
        assert_eq!(bridge.state(), BridgeState::EditingEnabled);
    }

    #[test]
    fn test_server_mount_rejected() {
        let bridge = VisualEditingBridge::new(
            ExecutionContext::Server,
            EditingModeSignal::active(),
            Counting::default(),
        );
        let err = assert_err!(bridge.mount());
        assert!(matches!(err, Error::EnvironmentViolation { .. }));
        assert_eq!(bridge.state(), BridgeState::Unmounted);
    }

    #[test]
    fn test_enable_before_mount() {
        let bridge = editor_bridge();
        let err = assert_err!(bridge.enable());
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(bridge.activator().calls(), 0);
    }

    #[test]
    fn test_visitor_stays_mounted() {
        let bridge = VisualEditingBridge::new(
            ExecutionContext::Client,
            EditingModeSignal::inactive(),
            Counting::default(),
        );
        bridge.mount().unwrap();
        assert!(!bridge.enable().unwrap());
        assert_eq!(bridge.state(), BridgeState::Mounted);
        assert_eq!(bridge.activator().calls(), 0);
    }

    #[test]
    fn test_failed_activation_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let bridge = VisualEditingBridge::new(
            ExecutionContext::Client,
            EditingModeSignal::active(),
            move || {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::invalid_state("overlay script not loaded"))
                } else {
                    Ok(())
                }
            },
        );
        bridge.mount().unwrap();

        assert!(bridge.enable().is_err());
        assert_eq!(bridge.state(), BridgeState::Mounted);
        assert!(bridge.enable().unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_enable_activates_once() {
        let bridge = Arc::new(editor_bridge());
        bridge.mount().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                std::thread::spawn(move || bridge.enable().unwrap())
            })
            .collect();
        let enabled = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|enabled| *enabled)
            .count();

        assert_eq!(enabled, 1);
        assert_eq!(bridge.activator().calls(), 1);
    }
}
