// Copyright 2024 XGov Relayer Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # XGov Relayer
//!
//! An automation relayer for cross-chain governance. It keeps the three
//! steps of the workflow moving without anyone touching a key:
//!
//! - while a proposal collects votes across chains, the relayer bridges
//!   each spoke network's tally back to the hub governor;
//! - once a proposal passes, the relayer executes it on the hub and
//!   prunes proposals that were canceled, defeated, or executed by
//!   someone else;
//! - on networks governed through the bridge, the relayer discovers
//!   newly signed bridge messages, queues them on the temporal governor,
//!   and executes them after their timelock elapses.
//!
//! Pending work survives restarts in a [sled](https://sled.rs) store and
//! every outcome is pushed to the operators' channels.

/// Contract bindings and middleware adapters.
pub mod chains;
/// Configuration loading and validation.
pub mod config;
/// The shared relayer context and shutdown plumbing.
pub mod context;
/// The relayer error type.
pub mod error;
/// Proposal lifecycle types and the contract traits.
pub mod governance;
/// Operator notifications.
pub mod notify;
/// The poll-and-process scan over pending actions.
pub mod poller;
/// Machine-readable probe events.
pub mod probe;
/// Retry policies.
pub mod retry;
/// Task startup.
pub mod service;
/// Durable stores for pending actions and sequence marks.
pub mod store;
/// The automation tasks.
pub mod tasks;
/// Small shared helpers.
pub mod utils;
/// Fetching signed bridge messages.
pub mod vaa;

pub use error::{Error, Result};
