// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Virtual path canonicalization.
//!
//! Every path entering the engine is rewritten into its canonical form:
//! absolute, `/`-separated, with no empty, `.` or `..` components and no
//! trailing slash (except the root itself). Mount prefixes are compared
//! byte-wise against canonical paths, so this module is the only producer of
//! the paths the resolver ever sees.

/// Canonicalize `path` in place.
///
/// The rewrite only ever shrinks the string:
/// - runs of slashes collapse to one;
/// - `/.` components are removed;
/// - `/..` components remove the preceding component, and are a no-op at the
///   root (the leading `/` is never consumed);
/// - a component merely *starting* with dots (`/.thing`, `/..first`) is kept
///   verbatim;
/// - a trailing slash is stripped unless the whole result is `/`;
/// - a non-empty input that reduces to nothing becomes `/`.
pub fn normalize(path: &mut String) {
    let mut buf = std::mem::take(path).into_bytes();
    compact(&mut buf);
    // compact only drops ASCII '/' and '.' bytes and shifts whole bytes
    // left, so the buffer stays valid UTF-8.
    debug_assert!(std::str::from_utf8(&buf).is_ok());
    *path = unsafe { String::from_utf8_unchecked(buf) };
}

// Reads out of range behave as a terminator, which lets the component rules
// look ahead past the end of the buffer.
#[inline]
fn at(buf: &[u8], pos: usize) -> u8 {
    if pos < buf.len() {
        buf[pos]
    } else {
        0
    }
}

fn compact(buf: &mut Vec<u8>) {
    let input_len = buf.len();
    let mut write = 0usize;
    let mut read = 0usize;

    while write < input_len {
        loop {
            if at(buf, read) != b'/' {
                break;
            }
            if at(buf, read + 1) == b'/' {
                // "//", "///", ...
                read += 1;
            } else if at(buf, read + 1) == b'.' {
                let c2 = at(buf, read + 2);
                let c3 = at(buf, read + 3);
                if c2 == b'.' && (c3 == 0 || c3 == b'/') {
                    // "/.." removes the component before it
                    read += 3;
                    while write > 0 && at(buf, write - 1) != b'/' {
                        write -= 1;
                    }
                    if write != 0 {
                        write -= 1;
                    }
                } else if c2 == b'/' || c2 == 0 {
                    // "/."
                    read += 2;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let c = at(buf, read);
        if c == 0 {
            break;
        }
        buf[write] = c;
        write += 1;
        read += 1;
    }

    // remove trailing slash
    if write > 1 && buf[write - 1] == b'/' {
        write -= 1;
    }

    // fixup root slash
    if write == 0 && input_len >= 1 {
        buf[0] = b'/';
        write = 1;
    }

    buf.truncate(write);
}
