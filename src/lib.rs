// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod application; // fragments wired across processes
pub mod args;        // typed arguments
pub mod component;   // named, argument-carrying base
pub mod conditions;  // scheduling conditions
pub mod config;      // config files + options
pub mod connectors;  // queues, network edges, wire framing
pub mod distributed; // driver / worker coordination
pub mod engine;      // fragment executors
pub mod errors;      // error handling
pub mod fragment;
pub mod graph;       // operator and fragment graphs
pub mod observability;
pub mod operator;
pub mod operators;   // bundled demo operators
pub mod resources;   // thread pools
pub mod scheduler;
pub mod spec;        // operator port declarations
