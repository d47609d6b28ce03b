//! End-to-end tests for pix-reconcile.
//!
//! Every test starts a stub gateway and a real service on ephemeral ports,
//! then drives the service over HTTP the way the gateway and the dashboard
//! would.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test e2e
//! cargo test --test e2e webhook
//! cargo test --test e2e reconciliation
//! ```

mod harness;
mod reconciliation;
mod stub_gateway;
mod webhook;

pub use harness::{TestHarness, WEBHOOK_SECRET};
