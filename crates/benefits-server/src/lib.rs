// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Composition root for the benefits server scope core.
//!
//! The HTTP layer mounts on top of [`ScopeCore`]: it builds an
//! [`benefits_server_auth::AuthContext`] and
//! [`benefits_server_auth::RequestView`] per request, runs each
//! [`benefits_server_auth::ProtectedOperation`] through
//! [`ScopeCore::authorizer`], and reads and writes through
//! [`ScopeCore::accessor`].

pub mod error;
pub mod scope_core;
pub mod telemetry;

pub use error::{Result, ServerError};
pub use scope_core::{GrantCache, ScopeCore};
pub use telemetry::init_tracing;
