#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]

//! # inlinehook
//!
//! An inline code-hooking engine: given the address of an existing function
//! (or a vtable-style slot) and a replacement address, redirect control flow
//! to the replacement while keeping the ability to restore the original.
//!
//! The pieces:
//!
//! - [`protect`] — make a memory range writable/executable before patching
//! - [`plan`] — pure computation of the bytes a hook writes
//! - [`hook`] — the install/uninstall state machine owning one hook
//! - [`scan`] — wildcard byte-pattern scanning to find hook targets
//! - [`address`] — the address value type used at the boundary
//!
//! Everything is single-threaded by design: no operation is safe to invoke
//! concurrently on the same hook or on overlapping source ranges, and a
//! patch written while another thread executes inside the patched range is
//! undefined behavior. The library logs through the [`log`] facade and never
//! installs a logger.

pub mod address;
pub mod hook;
pub mod plan;
pub mod protect;
pub mod scan;

pub use address::Address;
pub use hook::{fast_hook, Hook, HookError};
pub use plan::{BranchOpcode, PatchPlan, Style, BRANCH_PATCH_WIDTH};
pub use protect::ProtectionError;
pub use scan::{locate, ModuleImage};
