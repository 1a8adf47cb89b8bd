//! # Scan
//!
//! This module locates byte patterns inside a loaded module's mapped image,
//! used to resolve hook targets when no static address is known.
//!
//! The scan is a plain linear first-match walk, O(image × pattern) with no
//! preprocessing; it runs once per hook setup, not in a hot path.

use log::trace;

use crate::address::Address;

/// Mask byte meaning "match any byte at this position"
pub const WILDCARD: u8 = b'?';

/// Bounds of a module's mapped image, resolved from one address known to lie
/// inside it.
///
/// Ephemeral: recompute per scan (or cache it yourself); nothing here tracks
/// module load or unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleImage {
    /// Image base address
    base: Address,
    /// Image size in bytes
    len: usize,
}

impl ModuleImage {
    /// Resolves the image enclosing `known` via the platform loader
    /// metadata. Returns `None` when the address belongs to no loaded
    /// module.
    pub fn resolve(known: Address) -> Option<Self> {
        platform::resolve(known)
    }

    /// Image base address
    pub fn base(&self) -> Address {
        self.base
    }

    /// Image size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `addr` lies inside the image bounds
    pub fn contains(&self, addr: Address) -> bool {
        addr.get() >= self.base.get() && addr.get() - self.base.get() < self.len
    }

    /// Views the mapped image as a byte slice.
    ///
    /// # Safety
    ///
    /// The module must remain loaded (and its image mapped readable for the
    /// full length) while the slice is alive.
    pub unsafe fn bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.base.as_ptr(), self.len)
    }
}

/// Finds the first occurrence of `pattern` in `haystack`, treating positions
/// whose `mask` byte is [`WILDCARD`] as match-anything.
///
/// `mask` and `pattern` must be the same length; a length mismatch or an
/// empty mask finds nothing. The lowest matching offset wins.
pub fn find_in(haystack: &[u8], pattern: &[u8], mask: &[u8]) -> Option<usize> {
    if mask.is_empty() || mask.len() != pattern.len() {
        return None;
    }

    haystack.windows(mask.len()).position(|window| {
        window
            .iter()
            .zip(pattern.iter().zip(mask.iter()))
            .all(|(&byte, (&want, &mask_byte))| mask_byte == WILDCARD || byte == want)
    })
}

/// Locates `pattern` inside the module image enclosing `known`, returning
/// the absolute address of the first match.
///
/// Returns `None` when the module cannot be resolved, the mask is empty or
/// mismatched, or no offset matches.
///
/// # Safety
///
/// The module containing `known` must remain loaded for the duration of the
/// call; the scan reads its entire mapped image.
pub unsafe fn locate(known: Address, pattern: &[u8], mask: &[u8]) -> Option<Address> {
    if mask.is_empty() || mask.len() != pattern.len() {
        return None;
    }

    let image = ModuleImage::resolve(known)?;
    trace!(
        "scanning module at {} ({} bytes) for a {}-byte pattern",
        image.base(),
        image.len(),
        mask.len()
    );

    // Safety: caller keeps the module loaded while we scan
    let offset = find_in(image.bytes(), pattern, mask)?;
    Some(image.base().offset(offset))
}

#[cfg(unix)]
mod platform {
    //! Loader-metadata module resolution: `dladdr` names the enclosing
    //! object and its base; the backing file's size stands in for the image
    //! extent

    use std::mem;

    use super::ModuleImage;
    use crate::address::Address;

    /// Resolves the object containing `known` from the dynamic-linker map
    pub(super) fn resolve(known: Address) -> Option<ModuleImage> {
        let mut info: libc::Dl_info = unsafe { mem::zeroed() };
        // Safety: dladdr only writes the out-param on success
        if unsafe { libc::dladdr(known.as_ptr(), &mut info) } == 0 {
            return None;
        }
        if info.dli_fbase.is_null() || info.dli_fname.is_null() {
            return None;
        }

        let mut stat: libc::stat = unsafe { mem::zeroed() };
        // Safety: dli_fname is a NUL-terminated path owned by the loader
        if unsafe { libc::stat(info.dli_fname, &mut stat) } != 0 {
            return None;
        }
        if stat.st_size <= 0 {
            return None;
        }

        Some(ModuleImage {
            base: Address::from_ptr(info.dli_fbase as *const u8),
            len: stat.st_size as usize,
        })
    }
}

#[cfg(windows)]
mod platform {
    //! Image-header module resolution: `VirtualQuery` gives the allocation
    //! base, the PE headers give the image size

    use std::mem;

    use windows_sys::Win32::System::Memory::{VirtualQuery, MEMORY_BASIC_INFORMATION};

    use super::ModuleImage;
    use crate::address::Address;

    /// "MZ"
    const DOS_SIGNATURE: u16 = 0x5A4D;
    /// "PE\0\0"
    const NT_SIGNATURE: u32 = 0x0000_4550;
    /// Offset of `OptionalHeader.SizeOfImage` from the NT headers; the field
    /// sits at the same offset in PE32 and PE32+ optional headers
    const SIZE_OF_IMAGE_OFFSET: usize = 4 + 20 + 56;

    /// IMAGE_DOS_HEADER, trimmed to the fields the walk reads
    #[repr(C, packed)]
    struct DosHeader {
        /// Must equal [`DOS_SIGNATURE`]
        e_magic: u16,
        /// Unread legacy DOS fields
        _reserved: [u16; 29],
        /// Offset from the image base to the NT headers
        e_lfanew: i32,
    }

    /// Resolves the image containing `known` by walking its PE headers
    pub(super) fn resolve(known: Address) -> Option<ModuleImage> {
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
        // Safety: VirtualQuery only writes the out-param up to the length we pass
        let written = unsafe {
            VirtualQuery(
                known.as_ptr(),
                &mut info,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 || info.AllocationBase.is_null() {
            return None;
        }
        let base = info.AllocationBase as *const u8;

        // Safety: the allocation base of a mapped module starts with its headers
        let dos = unsafe { &*(base as *const DosHeader) };
        if dos.e_magic != DOS_SIGNATURE {
            return None;
        }
        let nt = unsafe { base.offset(dos.e_lfanew as isize) };
        // Safety: e_lfanew points at the NT headers within the same mapping
        if unsafe { *(nt as *const u32) } != NT_SIGNATURE {
            return None;
        }
        // Safety: SizeOfImage lies within the optional header just validated
        let size_of_image = unsafe { *(nt.add(SIZE_OF_IMAGE_OFFSET) as *const u32) };
        if size_of_image == 0 {
            return None;
        }

        Some(ModuleImage {
            base: Address::from_ptr(base),
            len: size_of_image as usize,
        })
    }
}
