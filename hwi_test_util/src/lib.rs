//! Simulated hardware wallets and fixtures for the tests of the workspace.
//!
//! Every simulated device holds a software key derived from [`TEST_MNEMONIC`] and counts the
//! calls it receives in a shared [`Stats`], so that tests can assert no I/O happened.

mod backend;
mod bitbox;
mod coldcard;
mod keys;
mod ledger;
pub mod psbt;
mod trezor;

use std::sync::atomic::{AtomicUsize, Ordering};

pub use backend::{Simulated, SimulatedBackend};
pub use bitbox::SimulatedBitBox;
pub use coldcard::{SimulatedColdcard, BACKUP_MAGIC};
pub use keys::TestSeed;
pub use ledger::SimulatedLedger;
pub use trezor::SimulatedTrezor;

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const TEST_MNEMONIC_XPUB: &str =
"tpubD6NzVbkrYhZ4XYa9MoLt4BiMZ4gkt2faZ4BcmKu2a9te4LDpQmvEz2L2yDERivHxFPnxXXhqDRkUNnQCpZggCyEZLBktV7VaSmwayqMJy1s";
pub const TEST_MNEMONIC_FINGERPRINT: &str = "73c5da0a";

/// A second mnemonic, for devices that must not share the keys of the first one
pub const OTHER_MNEMONIC: &str = "glory promote mansion idle axis finger extra february uncover one trip resource lawn turtle enact monster seven myth punch hobby comfort wild raise skin";

/// Counters shared between a simulated device and the test observing it
#[derive(Debug, Default)]
pub struct Stats {
    opened: AtomicUsize,
    calls: AtomicUsize,
    closed: AtomicUsize,
}

impl Stats {
    /// How many times a transport to the device was opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// How many vendor calls reached the device
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many times the transport was closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
