//! # switchyard
//!
//! An inter-process RPC fabric for a modular IP routing suite, plus the BGP
//! route-table pipeline built on top of it.
//!
//! ## The fabric
//!
//! Processes talk through *Xrls*: structured request names of the form
//! `target/command?args`. The [`finder::Finder`] is the process-wide
//! directory: every daemon registers a target there, advertises the
//! commands it serves, and resolves other daemons' commands through it.
//! The [`router::XrlRouter`] is the per-process facade that does the
//! registering, caching and dispatching; [`messenger`] matches requests to
//! replies over framed TCP [`carrier`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard::config::FabricConfig;
//! use switchyard::context::ProcessContext;
//! use switchyard::domain_types::{ClassName, CommandName, TargetName};
//! use switchyard::router::XrlRouter;
//! use switchyard::xrl::XrlArgs;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let router = XrlRouter::new(
//!     FabricConfig::default(),
//!     ProcessContext::local(),
//!     TargetName::try_new("bgp-1")?,
//!     ClassName::try_new("bgp")?,
//!     false,
//! )
//! .await?;
//! router
//!     .add_handler(
//!         CommandName::try_new("hello")?,
//!         Arc::new(|_ctx, _xrl| Ok(XrlArgs::new())),
//!     )
//!     .await?;
//! router.wait_until_ready().await;
//!
//! let reply = router.send(&"rib/version".parse()?).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
//!
//! ## The pipeline
//!
//! [`bgp::BgpPlumbing`] wires per-peer RibIn branches through policy
//! filters, next-hop lookup and Decision into a Fanout stage with
//! per-subscriber backpressure, ending in per-output RibOuts. [`rip`]
//! holds the representative paced-output machinery.

pub mod bgp;
pub mod carrier;
pub mod command_map;
pub mod config;
pub mod context;
pub mod domain_types;
pub mod error;
pub mod finder;
pub mod messenger;
pub mod net;
pub mod rip;
pub mod router;
pub mod wire;
pub mod xrl;

pub use command_map::{CommandMap, CommandResult, XrlHandler};
pub use config::FabricConfig;
pub use context::ProcessContext;
pub use error::{XrlError, XrlErrorCode};
pub use finder::Finder;
pub use messenger::{MessengerHandle, MessengerId, RequestContext};
pub use router::XrlRouter;
pub use xrl::{AtomValue, ResolvedXrl, Xrl, XrlArgs, XrlAtom};
