//! # Address
//!
//! A thin value type wrapping a machine address, used at the API boundary so
//! callers can move between raw pointers and integer addresses without
//! sprinkling casts everywhere

use std::fmt;

/// A machine address.
///
/// Wraps a `usize` so that hook targets resolved from different sources
/// (static symbols, computed offsets, pattern scans) share one currency type.
/// The null address is the `Default` value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
    /// The null address
    pub const NULL: Self = Self(0);

    /// Creates an address from its integer representation
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Creates an address from a raw pointer
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Returns the integer representation of the address
    pub const fn get(self) -> usize {
        self.0
    }

    /// Returns the address as a const pointer
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// Returns the address as a mut pointer.
    ///
    /// Writing through the result requires that the location is writable;
    /// see [`crate::protect::relax`].
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address displaced by `count` bytes, wrapping on overflow
    pub const fn offset(self, count: usize) -> Self {
        Self(self.0.wrapping_add(count))
    }
}

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<Address> for usize {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl<T> From<*const T> for Address {
    fn from(ptr: *const T) -> Self {
        Self(ptr as usize)
    }
}

impl<T> From<*mut T> for Address {
    fn from(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
