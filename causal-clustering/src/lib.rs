//! Consensus and replication core for a clustered database.
//!
//! This crate holds the pieces of a core cluster member that sit around the
//! Raft algorithm itself: agreeing on a cluster identity, tracking who takes
//! part in replication, caching freshly appended log entries, shipping Raft
//! messages to peers and answering client routing queries.
//!
//! # Architecture
//!
//! - **Binding**: on startup [`binder::ClusterBinder`] reads durable state and
//!   the discovery service until it obtains (or creates) a [`identity::ClusterId`].
//! - **Membership**: [`membership`] records voting and catching-up members and
//!   persists the voting set through a two-slot rotating log.
//! - **Caching**: [`cache`] holds bounded containers for recently appended
//!   entries so followers can be served without touching disk.
//! - **Messaging**: [`messaging`] gives every peer one bounded queue and one
//!   delivery thread, so `send` never blocks the Raft worker.
//! - **Routing**: [`routing`] derives route/read/write endpoint lists for
//!   client drivers from topology and leader knowledge.
//!
//! Collaborators owned elsewhere (discovery, the storage engine, the Raft
//! leader state) are traits in [`discovery`] and [`binder`].
//!
//! # Modules
//!
//! - [`identity`]: cluster, member, database and store identifiers
//! - [`marshal`]: byte encodings for persisted values
//! - [`cache`]: circular buffer, index-keyed cache and in-flight cache
//! - [`state`]: single-value and rotating durable storage
//! - [`membership`]: Raft membership state with listeners
//! - [`discovery`]: topology types and discovery/leader traits
//! - [`binder`]: cluster binding and bootstrap
//! - [`messages`]: Raft messages shipped between members
//! - [`messaging`]: non-blocking outbound channels
//! - [`routing`]: load balancing and routing procedures
//! - [`config`]: cluster settings
//! - [`error`]: error types

pub mod binder;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod marshal;
pub mod membership;
pub mod messages;
pub mod messaging;
pub mod routing;
pub mod state;
pub mod throttle;
