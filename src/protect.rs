//! # Protect
//!
//! This module contains the memory-protection toggler used to make patch
//! targets writable before any bytes are touched

use region::Protection;
use thiserror::Error;

/// Errors when relaxing memory protection
#[derive(Debug, Error)]
pub enum ProtectionError {
    /// The OS refused to change the protection flags of the range, e.g.
    /// because it is not part of a mapped, protect-able region
    #[error("Error relaxing memory protections")]
    Denied(#[from] region::Error),
}

/// Marks the byte range `[addr, addr + len)` readable, writable and
/// executable.
///
/// The underlying primitive operates on whole pages, so the effective start
/// is rounded down to the enclosing page boundary with `len` applied from the
/// rounded base. Callers only ever need `len` to cover the bytes they intend
/// to patch; the rounding can only widen the affected range.
///
/// The widening is one-way: this crate never re-narrows protections, so a
/// patched-and-restored function stays writable until the process exits.
/// Failures are not retried.
///
/// # Safety
///
/// `addr` must point into memory mapped by this process. Making a range
/// writable that other code relies on being read-only is itself a safety
/// hazard; the caller takes responsibility for every byte of the affected
/// pages, not just `[addr, addr + len)`.
pub unsafe fn relax(addr: *const u8, len: usize) -> Result<(), ProtectionError> {
    region::protect(addr, len, Protection::READ_WRITE_EXECUTE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::slice;

    use region::Protection;

    use super::relax;

    #[test]
    /// Relaxing a read-only range makes it writable
    fn test_relax_readonly() {
        // Global immutables are stored in a read-only section in the binary,
        // so writing to this without relaxing protection would segfault
        let data = b"1234";

        let ptr = data.as_ptr();
        let size = data.len();

        // sanity check: the data is what we expect and is actually read-only
        assert_eq!(
            unsafe { slice::from_raw_parts(ptr, size) },
            [b'1', b'2', b'3', b'4']
        );
        for region in region::query_range(ptr, size).unwrap() {
            let region = region.unwrap();
            assert_eq!(region.protection(), Protection::READ);
        }

        unsafe { relax(ptr, size).unwrap() };

        // the range must now be writable
        unsafe {
            std::ptr::write(ptr as *mut u8, b'9');
        }
        assert_eq!(
            unsafe { slice::from_raw_parts(ptr, size) },
            [b'9', b'2', b'3', b'4']
        );

        // and the widening sticks: no guard re-narrows it
        for region in region::query_range(ptr, size).unwrap() {
            let region = region.unwrap();
            assert_eq!(region.protection(), Protection::READ_WRITE_EXECUTE);
        }
    }

    #[test]
    /// Relaxing an unmapped range reports `Denied`
    fn test_relax_unmapped() {
        // an address that is never mapped on either supported platform
        let result = unsafe { relax(1usize as *const u8, 16) };
        assert!(result.is_err());
    }
}
