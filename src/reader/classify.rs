use std::io;

/// Windows: the file is held open by another process without sharing.
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows: a region of the file is locked by another process.
const ERROR_LOCK_VIOLATION: i32 = 33;
/// Unix: device or resource busy.
const EBUSY: i32 = 16;
/// Unix: text file busy (being written while executed, or vice versa).
const ETXTBSY: i32 = 26;

/// Default transient-error predicate.
///
/// Only lock contention style failures count as transient. Permission
/// errors, corruption and the like surface immediately instead of being
/// masked by retries.
pub fn is_transient_io_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    match error.raw_os_error() {
        Some(code) if cfg!(windows) => {
            code == ERROR_SHARING_VIOLATION || code == ERROR_LOCK_VIOLATION
        }
        Some(code) => code == EBUSY || code == ETXTBSY,
        None => false,
    }
}
