// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use core::fmt;

/// POSIX-style error codes returned by the glue surface.
///
/// These are the only errors the core can report through a
/// return value. I/O failures are never represented here: they
/// are delivered exclusively through a block I/O completion
/// callback (see `bio::submit`).
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Errno {
    /// Out of memory.
    Enomem = 1,

    /// No such device or address.
    Enxio = 2,

    /// The requested name was not found.
    Enoent = 3,

    /// The device is read-only.
    Erofs = 4,

    /// The file descriptor is not open or not valid.
    Ebadf = 5,

    /// The requested buffer or value is too large.
    E2big = 6,

    /// The underlying device reported a transfer failure.
    Eio = 7,
}

impl Errno {
    /// Returns the numeric value a caller would see through the
    /// glue surface's C-style return codes.
    ///
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Errno::Enomem => "out of memory",
            Errno::Enxio => "no such device or address",
            Errno::Enoent => "not found",
            Errno::Erofs => "read-only filesystem",
            Errno::Ebadf => "bad file descriptor",
            Errno::E2big => "argument too large",
            Errno::Eio => "I/O error",
        };
        f.write_str(text)
    }
}
