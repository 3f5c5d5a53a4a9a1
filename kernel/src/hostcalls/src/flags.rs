// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use bitflags::bitflags;

bitflags! {
    /// The mode bitfield accepted by the glue surface's `open` call.
    ///
    /// `BLOCK` must always be set: this core has no other kind of
    /// file to open. The remaining bits encode an access mode,
    /// read via [`OpenMode::access`].
    ///
    pub struct OpenMode: u32 {
        /// Open for block I/O. Required.
        const BLOCK = 1 << 0;

        /// Open for writing only.
        const WRONLY = 1 << 1;

        /// Open for both reading and writing.
        const RDWR = 1 << 2;
    }
}

/// The access mode requested by an `open` call, decoded from
/// [`OpenMode`]'s sub-field.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    /// Read-only access (the default when neither `WRONLY` nor
    /// `RDWR` is set).
    ReadOnly,

    /// Write-only access.
    WriteOnly,

    /// Read and write access.
    ReadWrite,
}

impl OpenMode {
    /// Decodes the access-mode sub-field.
    ///
    /// `WRONLY` and `RDWR` are mutually exclusive as far as this
    /// core is concerned; if both are set, `RDWR` takes priority,
    /// as the more permissive of the two.
    ///
    pub fn access(self) -> AccessMode {
        if self.contains(OpenMode::RDWR) {
            AccessMode::ReadWrite
        } else if self.contains(OpenMode::WRONLY) {
            AccessMode::WriteOnly
        } else {
            AccessMode::ReadOnly
        }
    }

    /// Returns whether this access mode requires write access to
    /// the underlying device.
    ///
    pub fn needs_write(self) -> bool {
        matches!(self.access(), AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

bitflags! {
    /// The operation bit passed to `bio::submit`, distinguishing
    /// a read from a write.
    ///
    pub struct BioOp: u32 {
        /// Read data from the device into the caller's buffer.
        const READ = 1 << 0;

        /// Write data from the caller's buffer to the device.
        const WRITE = 1 << 1;
    }
}

impl BioOp {
    /// Returns whether this is a read operation.
    ///
    pub fn is_read(self) -> bool {
        self.contains(BioOp::READ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_defaults_to_read_only() {
        assert_eq!(OpenMode::BLOCK.access(), AccessMode::ReadOnly);
        assert!(!OpenMode::BLOCK.needs_write());
    }

    #[test]
    fn open_mode_decodes_write_variants() {
        let wronly = OpenMode::BLOCK | OpenMode::WRONLY;
        assert_eq!(wronly.access(), AccessMode::WriteOnly);
        assert!(wronly.needs_write());

        let rdwr = OpenMode::BLOCK | OpenMode::RDWR;
        assert_eq!(rdwr.access(), AccessMode::ReadWrite);
        assert!(rdwr.needs_write());
    }

    #[test]
    fn bio_op_distinguishes_read_and_write() {
        assert!(BioOp::READ.is_read());
        assert!(!BioOp::WRITE.is_read());
    }
}
