//! # Patch plan
//!
//! Pure computation of the bytes a hook writes at its target. No I/O happens
//! here; the [`crate::hook`] module is responsible for actually writing the
//! plan into memory

use crate::address::Address;

/// Width of a relative-branch patch: one opcode byte plus a rel32 field
pub const BRANCH_PATCH_WIDTH: usize = 5;

/// Single-byte x86 NOP used to fill the tail of an oversized branch patch
const NOP: u8 = 0x90;

/// Which relative-branch instruction a [`Style::RelativeBranch`] hook emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOpcode {
    /// `jmp rel32` (0xE9)
    Jump,
    /// `call rel32` (0xE8)
    Call,
}

impl BranchOpcode {
    /// The encoded opcode byte
    pub const fn byte(self) -> u8 {
        match self {
            Self::Jump => 0xE9,
            Self::Call => 0xE8,
        }
    }
}

/// Interception style of a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Overwrite a pointer-sized slot (e.g. a vtable or function-pointer
    /// table entry) with the destination address itself. The target is data,
    /// not instructions.
    DirectWrite,
    /// Overwrite the first bytes of executable code with a relative branch
    /// to the destination
    RelativeBranch(BranchOpcode),
}

impl Style {
    /// The branch opcode for this style, if it has one
    pub const fn opcode(self) -> Option<BranchOpcode> {
        match self {
            Self::DirectWrite => None,
            Self::RelativeBranch(opcode) => Some(opcode),
        }
    }
}

/// The exact bytes to write at a hook's source, plus the logical "original
/// address" the caller should observe afterwards.
///
/// Computed once per hook by [`PatchPlan::compute`] and retained by the hook
/// so that re-installs never recompute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    /// Bytes to be written at the source address
    bytes: Vec<u8>,
    /// Derived "where to find the original control flow" value; the saved
    /// original bytes, not this address, are the ground truth for restoration
    original_address: Address,
}

impl PatchPlan {
    /// Computes the patch for redirecting `source` to `destination`.
    ///
    /// `patch_width` must already be validated for the style (at least
    /// [`BRANCH_PATCH_WIDTH`] for a relative branch, exactly the pointer
    /// width for a direct write); [`crate::hook::Hook::create`] rejects
    /// anything else before calling in here.
    ///
    /// For `RelativeBranch` the plan is the opcode byte followed by the
    /// little-endian rel32 displacement `destination - (source + 5)`, with
    /// any remaining bytes up to `patch_width` filled with NOPs. No
    /// reachability check is made: a destination outside the signed 32-bit
    /// range of `source` silently truncates (see
    /// [`relative_displacement`]).
    pub fn compute(
        source: Address,
        destination: Address,
        style: Style,
        patch_width: usize,
    ) -> Self {
        match style {
            Style::DirectWrite => Self {
                bytes: destination.get().to_le_bytes().to_vec(),
                original_address: source,
            },
            Style::RelativeBranch(opcode) => {
                let mut bytes = Vec::with_capacity(patch_width);
                bytes.push(opcode.byte());
                bytes.extend_from_slice(
                    &relative_displacement(source, destination).to_le_bytes(),
                );
                bytes.resize(patch_width, NOP);

                let original_address = match opcode {
                    BranchOpcode::Jump => source,
                    // Not a valid decode of a call target, but kept exactly
                    // as-is: callers may depend on the numeric value.
                    BranchOpcode::Call => Address::new(
                        source
                            .get()
                            .wrapping_add(1)
                            .wrapping_add(source.get().wrapping_add(BRANCH_PATCH_WIDTH)),
                    ),
                };

                Self {
                    bytes,
                    original_address,
                }
            }
        }
    }

    /// The bytes to write at the source address
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The derived original-address value for this plan
    pub fn original_address(&self) -> Address {
        self.original_address
    }

    /// Consumes the plan, returning its parts
    pub(crate) fn into_parts(self) -> (Vec<u8>, Address) {
        (self.bytes, self.original_address)
    }
}

/// Computes the rel32 displacement of a branch at `source` targeting
/// `destination`: `destination - (source + 5)`, i.e. relative to the end of
/// the branch instruction.
///
/// The field is always 4 bytes wide. On 64-bit targets a destination farther
/// than ±2 GiB from `source` truncates silently; execution of such a patch is
/// undefined. This mirrors the platform limitation of the rel32 encoding
/// itself.
pub fn relative_displacement(source: Address, destination: Address) -> u32 {
    destination
        .get()
        .wrapping_sub(source.get().wrapping_add(BRANCH_PATCH_WIDTH)) as u32
}
