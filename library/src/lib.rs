/*!
Session controllers for the WebRTC tutorial pages.

# Overview

Every tutorial page (loopback, one-to-one call, one-to-many SFU and multi-stream
peer connection) is driven by a small state machine. The machine decides which
controls are enabled and sequences the signaling calls and peer connection steps
of a session. Machines are sans-IO: they consume [`Event`]s and emit [`Command`]s,
and never touch a socket or the DOM.

A [`SessionDriver`](driver::SessionDriver) runs a machine against three
collaborators: a [`SignalingChannel`](driver::SignalingChannel), a
[`MediaBackend`](driver::MediaBackend) and a [`View`](driver::View).
On `wasm32` the [`web`] module provides the browser implementations, bound to
kurento-jsonrpc, kurento-utils and stomp.js.

Pages: [loopback](loopback), [one-to-one](one_to_one),
[one-to-many](one_to_many) in multi-browser and multi-session flavours,
and [multistream].

*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // false positive in WASM (single threaded) context
)]
// clippy WARN level lints
#![warn(
    // missing_docs,
    clippy::cargo,
    clippy::pedantic,
    // clippy::nursery,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::integer_division,
    clippy::large_include_file,
    clippy::map_err_ignore,
    // clippy::missing_docs_in_private_items,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unreachable
)]
// clippy WARN level lints, that can be upgraded to DENY if preferred
#![warn(
    clippy::float_arithmetic,
    clippy::modulo_arithmetic,
    clippy::as_conversions,
    clippy::assertions_on_result_states,
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::default_union_representation,
    clippy::deref_by_slicing,
    clippy::empty_drop,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::filetype_is_file,
    clippy::float_cmp_const,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::pattern_type_mismatch,
    clippy::string_slice,
    clippy::try_err
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::shadow_unrelated,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern,
    clippy::unseparated_literal_suffix,
    clippy::verbose_file_reads
)]

pub mod affordance;
pub mod config;
pub(crate) mod constants;
mod context;
pub mod driver;
mod error;
#[cfg(feature = "loopback")]
pub mod loopback;
#[cfg(feature = "multistream")]
pub mod multistream;
#[cfg(feature = "one-to-many")]
pub mod one_to_many;
#[cfg(feature = "one-to-one")]
pub mod one_to_one;
pub mod session;
mod utils;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use affordance::{Affordances, Control};
pub use config::{Page, PageConfig};
pub use error::{Error, Result};
pub use rtc_tutorials_protocol as protocol;
pub use rtc_tutorials_protocol::{ClientType, IceCandidate, MediaProfile, UserId};
pub use session::{Command, Event, Session, SessionState};
pub use utils::{normalize_file_name, recording_file_name, set_panic_hook};
