// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Fragment name meaning "every fragment" in worker targeting.
pub const RESERVED_FRAGMENT_NAME: &str = "all";

/// Default driver listen address.
pub const DEFAULT_DRIVER_ADDRESS: &str = "0.0.0.0";
/// Default driver listen port.
pub const DEFAULT_DRIVER_PORT: u16 = 8765;
/// Default worker address; port 0 lets the OS pick.
pub const DEFAULT_WORKER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_WORKER_PORT: u16 = 0;

/// Connection attempts a network transmitter makes before giving up on its edge.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 20;
pub const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 100;
/// How long a network receiver waits for its upstream peers to show up.
pub const DEFAULT_PEER_WAIT_MS: u64 = 10_000;

/// Polling period of the multi-thread scheduler.
pub const DEFAULT_CHECK_RECESSION_PERIOD_MS: u64 = 5;

pub const ENV_STOP_ON_DEADLOCK_TIMEOUT: &str = "SLUICE_STOP_ON_DEADLOCK_TIMEOUT";
pub const ENV_MAX_DURATION_MS: &str = "SLUICE_MAX_DURATION_MS";
pub const ENV_CHECK_RECESSION_PERIOD_MS: &str = "SLUICE_CHECK_RECESSION_PERIOD_MS";
