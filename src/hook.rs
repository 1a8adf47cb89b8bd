//! # Hook
//!
//! This module owns the lifecycle of one inline hook: unprotect the target,
//! write the patch, optionally unpatch/repatch any number of times, and
//! finally drop the bookkeeping

use std::mem;
use std::ptr;

use log::{debug, trace};
use thiserror::Error;

use crate::address::Address;
use crate::plan::{BranchOpcode, PatchPlan, Style, BRANCH_PATCH_WIDTH};
use crate::protect::{self, ProtectionError};

/// Errors when creating or driving a hook
#[derive(Debug, Error)]
pub enum HookError {
    /// Null source or destination, or a patch width the style cannot encode
    #[error("invalid hook argument: null address or unusable patch width")]
    InvalidArgument,
    /// `install` was called while the patch is already written
    #[error("hook is already installed")]
    AlreadyInstalled,
    /// `uninstall` was called while the patch is not written
    #[error("hook is not installed")]
    NotInstalled,
    /// The OS refused to make the source range writable
    #[error(transparent)]
    Protection(#[from] ProtectionError),
}

/// One active (or reverted) inline hook.
///
/// A `Hook` exclusively owns the byte buffers it needs for restoration;
/// nothing else aliases them. Its lifecycle is
/// `create → installed ⇄ uninstalled → drop`, where dropping releases the
/// buffers but deliberately leaves `source` in whatever state it is in at
/// that moment. Restoring and destroying are independent: call
/// [`Hook::uninstall`] first if the original bytes should be back in place
/// after the hook is gone.
///
/// There is no internal synchronization. Installing or uninstalling while
/// another thread executes inside the patched range is undefined behavior;
/// callers must guarantee quiescence externally.
pub struct Hook {
    /// Address of the first byte overwritten by the patch. Owned externally;
    /// the hook never allocates or frees it
    source: Address,
    /// Address control is redirected to
    destination: Address,
    /// Interception style of this hook
    style: Style,
    /// Number of bytes the patch occupies at `source`
    patch_width: usize,
    /// Snapshot of `source` taken once, before the first write; ground truth
    /// for restoration
    original_bytes: Vec<u8>,
    /// The computed patch, retained so re-installs skip recomputation
    patch_bytes: Vec<u8>,
    /// Derived "where to find the original control flow" value; semantics
    /// depend on `style` (see [`PatchPlan::compute`])
    original_address: Address,
    /// Whether `patch_bytes` is currently written at `source`
    installed: bool,
    /// Whether the source range has had its protection relaxed
    unprotected: bool,
}

impl Hook {
    /// Creates a hook and immediately installs it.
    ///
    /// Validates the arguments, snapshots `patch_width` bytes from `source`,
    /// relaxes protection on the range, computes the patch and writes it.
    /// Any failure unwinds completely; no half-constructed hook ever
    /// escapes.
    ///
    /// `patch_width` must be at least [`BRANCH_PATCH_WIDTH`] for a relative
    /// branch. For [`Style::DirectWrite`] the patch always occupies exactly
    /// the machine pointer width regardless of the requested width, which
    /// only needs to be non-zero.
    ///
    /// # Safety
    ///
    /// - `source` must be valid for reads and (once relaxed) writes of
    ///   `patch_width` bytes, and must not be memory tracked by Rust
    /// - for [`Style::RelativeBranch`], `destination` must be executable
    ///   code and `source` must start an instruction sequence of at least
    ///   `patch_width` bytes that nothing is currently executing
    pub unsafe fn create(
        source: Address,
        destination: Address,
        patch_width: usize,
        style: Style,
    ) -> Result<Self, HookError> {
        if source.is_null() || destination.is_null() || patch_width == 0 {
            return Err(HookError::InvalidArgument);
        }
        let patch_width = match style {
            // the slot write is always exactly one pointer wide
            Style::DirectWrite => mem::size_of::<usize>(),
            Style::RelativeBranch(_) => {
                if patch_width < BRANCH_PATCH_WIDTH {
                    return Err(HookError::InvalidArgument);
                }
                patch_width
            }
        };

        // snapshot before anything is written; never touched again
        let mut original_bytes = vec![0u8; patch_width];
        // Safety: caller guarantees `source` is readable for `patch_width`
        ptr::copy_nonoverlapping(
            source.as_ptr::<u8>(),
            original_bytes.as_mut_ptr(),
            patch_width,
        );

        // Safety: caller guarantees `source` is a patchable mapped range
        protect::relax(source.as_ptr(), patch_width)?;

        let (patch_bytes, original_address) =
            PatchPlan::compute(source, destination, style, patch_width).into_parts();

        // Safety: the range was just relaxed and the plan is patch_width long
        ptr::copy_nonoverlapping(patch_bytes.as_ptr(), source.as_mut_ptr(), patch_width);

        debug!(
            "installed {:?} hook at {} -> {} ({} bytes)",
            style, source, destination, patch_width
        );

        Ok(Self {
            source,
            destination,
            style,
            patch_width,
            original_bytes,
            patch_bytes,
            original_address,
            installed: true,
            unprotected: true,
        })
    }

    /// Creates a five-byte `jmp` hook, the conventional default.
    ///
    /// # Safety
    ///
    /// Same contract as [`Hook::create`] with
    /// `Style::RelativeBranch(BranchOpcode::Jump)`.
    pub unsafe fn create_fast(source: Address, destination: Address) -> Result<Self, HookError> {
        Self::create(
            source,
            destination,
            BRANCH_PATCH_WIDTH,
            Style::RelativeBranch(BranchOpcode::Jump),
        )
    }

    /// Re-applies the patch after an [`Hook::uninstall`].
    ///
    /// Fails with [`HookError::AlreadyInstalled`] without touching memory if
    /// the patch is already in place. Relaxes protection lazily if the range
    /// was never unprotected.
    ///
    /// # Safety
    ///
    /// Same contract as [`Hook::create`]: the source range must still be
    /// valid and quiescent.
    pub unsafe fn install(&mut self) -> Result<(), HookError> {
        if self.installed {
            return Err(HookError::AlreadyInstalled);
        }
        if !self.unprotected {
            // Safety: caller guarantees the range is still mapped
            protect::relax(self.source.as_ptr(), self.patch_width)?;
            self.unprotected = true;
        }

        // Safety: the range is unprotected and the buffer is patch_width long
        ptr::copy_nonoverlapping(
            self.patch_bytes.as_ptr(),
            self.source.as_mut_ptr(),
            self.patch_width,
        );
        self.installed = true;
        trace!("re-installed hook at {}", self.source);
        Ok(())
    }

    /// Writes the saved original bytes back to `source`.
    ///
    /// Fails with [`HookError::NotInstalled`] without touching memory if the
    /// patch is not in place. The buffers are retained, so a later
    /// [`Hook::install`] re-applies the patch without recomputation.
    ///
    /// # Safety
    ///
    /// Same contract as [`Hook::install`].
    pub unsafe fn uninstall(&mut self) -> Result<(), HookError> {
        if !self.installed {
            return Err(HookError::NotInstalled);
        }

        // Safety: the range was unprotected when the patch was written
        ptr::copy_nonoverlapping(
            self.original_bytes.as_ptr(),
            self.source.as_mut_ptr(),
            self.patch_width,
        );
        self.installed = false;
        trace!("uninstalled hook at {}", self.source);
        Ok(())
    }

    /// Address of the first patched byte
    pub fn source(&self) -> Address {
        self.source
    }

    /// Address control is redirected to
    pub fn destination(&self) -> Address {
        self.destination
    }

    /// Interception style of this hook
    pub fn style(&self) -> Style {
        self.style
    }

    /// The branch opcode, when the style is a relative branch
    pub fn opcode(&self) -> Option<BranchOpcode> {
        self.style.opcode()
    }

    /// Number of bytes the patch occupies at the source
    pub fn patch_width(&self) -> usize {
        self.patch_width
    }

    /// The derived original-address value for this hook.
    ///
    /// For jump and direct-write hooks this is the source itself; for call
    /// hooks it is the historical `(source + 1) + (source + 5)` value (see
    /// [`PatchPlan::compute`]). The saved bytes, not this value, are what
    /// restoration uses.
    pub fn original_address(&self) -> Address {
        self.original_address
    }

    /// The bytes that were at the source before the first patch
    pub fn original_bytes(&self) -> &[u8] {
        &self.original_bytes
    }

    /// The bytes the patch writes at the source
    pub fn patch_bytes(&self) -> &[u8] {
        &self.patch_bytes
    }

    /// Whether the patch is currently written at the source
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Whether the source range has had its protection relaxed
    pub fn is_unprotected(&self) -> bool {
        self.unprotected
    }
}

/// Installs a permanent five-byte `jmp` hook and discards the bookkeeping.
///
/// The patch stays written (dropping a [`Hook`] never restores), so this is
/// a one-way operation for callers that will never want the original back.
///
/// # Safety
///
/// Same contract as [`Hook::create_fast`].
pub unsafe fn fast_hook(source: Address, destination: Address) -> Result<(), HookError> {
    Hook::create_fast(source, destination).map(drop)
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::{fast_hook, Hook, HookError};
    use crate::address::Address;
    use crate::plan::{BranchOpcode, Style, BRANCH_PATCH_WIDTH};

    /// Leaks a patchable scratch buffer so raw writes never alias a live Vec
    fn scratch(bytes: &[u8]) -> &'static mut [u8] {
        Vec::leak(bytes.to_vec())
    }

    #[test]
    /// Create-then-uninstall restores the pre-creation bytes exactly
    fn test_round_trip_restoration() {
        let buf = scratch(&[0x55, 0x8B, 0xEC, 0x83, 0xEC]);
        let snapshot = buf.to_vec();
        let source = Address::from_ptr(buf.as_ptr());
        let destination = source.offset(BRANCH_PATCH_WIDTH + 0x100);

        let mut hook = unsafe { Hook::create_fast(source, destination).unwrap() };

        assert!(hook.is_installed());
        assert!(hook.is_unprotected());
        // displacement 0x100 behind an 0xE9 jmp
        assert_eq!(buf, [0xE9, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(hook.patch_bytes(), buf);
        assert_eq!(hook.original_bytes(), snapshot.as_slice());

        unsafe { hook.uninstall().unwrap() };
        assert!(!hook.is_installed());
        assert_eq!(buf, snapshot.as_slice());
    }

    #[test]
    /// Wrong-state install/uninstall fail without modifying memory
    fn test_state_guards() {
        let buf = scratch(&[0x55, 0x8B, 0xEC, 0x83, 0xEC]);
        let source = Address::from_ptr(buf.as_ptr());

        let mut hook = unsafe { Hook::create_fast(source, source.offset(0x40)).unwrap() };

        let patched = buf.to_vec();
        assert!(matches!(
            unsafe { hook.install() },
            Err(HookError::AlreadyInstalled)
        ));
        assert_eq!(buf, patched.as_slice());

        unsafe { hook.uninstall().unwrap() };
        let restored = buf.to_vec();
        assert!(matches!(
            unsafe { hook.uninstall() },
            Err(HookError::NotInstalled)
        ));
        assert_eq!(buf, restored.as_slice());
    }

    #[test]
    /// Uninstall/install cycles re-apply the same patch bytes
    fn test_reinstall_cycle() {
        let buf = scratch(&[0x55, 0x8B, 0xEC, 0x83, 0xEC, 0x08]);
        let source = Address::from_ptr(buf.as_ptr());

        let mut hook = unsafe {
            Hook::create(
                source,
                source.offset(0x1000),
                BRANCH_PATCH_WIDTH,
                Style::RelativeBranch(BranchOpcode::Jump),
            )
            .unwrap()
        };
        let patched = buf.to_vec();

        for _ in 0..3 {
            unsafe { hook.uninstall().unwrap() };
            assert_eq!(&buf[..5], [0x55, 0x8B, 0xEC, 0x83, 0xEC]);
            unsafe { hook.install().unwrap() };
            assert_eq!(buf, patched.as_slice());
        }
        // the byte past the patch is never touched
        assert_eq!(buf[5], 0x08);
    }

    #[test]
    /// Direct writes overwrite a pointer-sized slot with the destination
    fn test_direct_write_slot() {
        let slot: &'static mut usize = Box::leak(Box::new(0xAABB));
        let source = Address::from_ptr(slot as *const usize);
        let destination = Address::new(0x5566_7788);

        let mut hook = unsafe {
            Hook::create(source, destination, mem::size_of::<usize>(), Style::DirectWrite)
                .unwrap()
        };

        assert_eq!(*slot, destination.get());
        assert_eq!(hook.original_address(), source);
        assert_eq!(hook.patch_width(), mem::size_of::<usize>());
        assert_eq!(hook.opcode(), None);

        unsafe { hook.uninstall().unwrap() };
        assert_eq!(*slot, 0xAABB);
    }

    #[test]
    /// Argument validation rejects nulls and unusable widths before any
    /// memory access
    fn test_invalid_arguments() {
        let buf = scratch(&[0u8; 8]);
        let source = Address::from_ptr(buf.as_ptr());

        assert!(matches!(
            unsafe { Hook::create_fast(Address::NULL, source) },
            Err(HookError::InvalidArgument)
        ));
        assert!(matches!(
            unsafe { Hook::create_fast(source, Address::NULL) },
            Err(HookError::InvalidArgument)
        ));
        assert!(matches!(
            unsafe {
                Hook::create(
                    source,
                    source.offset(0x10),
                    BRANCH_PATCH_WIDTH - 1,
                    Style::RelativeBranch(BranchOpcode::Jump),
                )
            },
            Err(HookError::InvalidArgument)
        ));
        // nothing was written by the failed attempts
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    /// Dropping a hook releases bookkeeping but leaves the patch in place
    fn test_drop_does_not_restore() {
        let buf = scratch(&[0x55, 0x8B, 0xEC, 0x83, 0xEC]);
        let source = Address::from_ptr(buf.as_ptr());

        let hook = unsafe { Hook::create_fast(source, source.offset(0x200)).unwrap() };
        let patched = buf.to_vec();
        drop(hook);
        assert_eq!(buf, patched.as_slice());

        // fast_hook is the same one-way contract in a single call
        let buf2 = scratch(&[0x90; 5]);
        let src2 = Address::from_ptr(buf2.as_ptr());
        unsafe { fast_hook(src2, src2.offset(0x80)).unwrap() };
        assert_eq!(buf2[0], 0xE9);
    }

    #[test]
    /// Accessors report the descriptor fields as created
    fn test_accessors() {
        let buf = scratch(&[0xCC; 5]);
        let source = Address::from_ptr(buf.as_ptr());
        let destination = source.offset(0x300);

        let hook = unsafe {
            Hook::create(
                source,
                destination,
                BRANCH_PATCH_WIDTH,
                Style::RelativeBranch(BranchOpcode::Call),
            )
            .unwrap()
        };

        assert_eq!(hook.source(), source);
        assert_eq!(hook.destination(), destination);
        assert_eq!(hook.style(), Style::RelativeBranch(BranchOpcode::Call));
        assert_eq!(hook.opcode(), Some(BranchOpcode::Call));
        assert_eq!(hook.original_bytes(), [0xCC; 5]);
        assert_eq!(hook.patch_bytes()[0], 0xE8);
    }
}
