// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The fixed environment-parameter table a guest kernel queries at
//! start of day, before it has any other way of discovering how many
//! CPUs it has or what its hostname is.

use hostcalls::Errno;

struct Param {
    name: &'static str,
    value: &'static str,
}

const PARAMS: &[Param] = &[
    Param {
        name: "_RUMPUSER_NCPU",
        value: "1",
    },
    Param {
        name: "_RUMPUSER_HOSTNAME",
        value: "rump4xen",
    },
    Param {
        name: "RUMP_VERBOSE",
        value: "1",
    },
    Param {
        name: "RUMP_MEMLIMIT",
        value: "8m",
    },
];

/// Looks up `name` and copies its value plus a NUL terminator into
/// `buf`, returning the number of bytes written.
///
/// Fails with [`Errno::Enoent`] if `name` is not one of the
/// recognised keys, or [`Errno::E2big`] if `buf` is too small to
/// hold the value and its terminator.
pub(crate) fn get(name: &str, buf: &mut [u8]) -> Result<usize, Errno> {
    let value = PARAMS
        .iter()
        .find(|param| param.name == name)
        .map(|param| param.value)
        .ok_or(Errno::Enoent)?;

    let needed = value.len() + 1;
    if buf.len() < needed {
        return Err(Errno::E2big);
    }

    buf[..value.len()].copy_from_slice(value.as_bytes());
    buf[value.len()] = 0;
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_parameters_round_trip_with_nul_terminator() {
        let mut buf = [0u8; 16];
        let written = get("_RUMPUSER_NCPU", &mut buf).unwrap();
        assert_eq!(written, 2);
        assert_eq!(&buf[..1], b"1");
        assert_eq!(buf[1], 0);
    }

    #[test]
    fn unknown_parameter_is_not_found() {
        let mut buf = [0u8; 16];
        assert_eq!(get("_RUMPUSER_BOGUS", &mut buf), Err(Errno::Enoent));
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let mut buf = [0u8; 1];
        assert_eq!(get("RUMP_MEMLIMIT", &mut buf), Err(Errno::E2big));
    }

    #[test]
    fn every_documented_key_resolves() {
        let mut buf = [0u8; 16];
        for name in ["_RUMPUSER_NCPU", "_RUMPUSER_HOSTNAME", "RUMP_VERBOSE", "RUMP_MEMLIMIT"] {
            assert!(get(name, &mut buf).is_ok(), "{name} should resolve");
        }
    }
}
