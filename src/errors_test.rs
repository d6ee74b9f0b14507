use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::*;

fn io_error(kind: io::ErrorKind) -> Arc<io::Error> {
    Arc::new(io::Error::new(kind, "boom"))
}

#[test]
fn test_error_fatal() {
    let err = Error::Fatal("critical failure".to_string());
    assert_eq!(err.to_string(), "Fatal error: critical failure");
}

#[test]
fn test_read_error_not_found() {
    let err = ReadError::NotFound {
        id: ResourceId::from("test.txt"),
    };
    assert_eq!(err.to_string(), "Resource not found: test.txt");
    assert!(err.is_not_found());
    assert!(!err.is_transient());
    assert_eq!(err.id().as_str(), "test.txt");
}

#[test]
fn test_read_error_transient_keeps_source() {
    let err = ReadError::TransientIo {
        id: ResourceId::from("locked.txt"),
        source: io_error(io::ErrorKind::WouldBlock),
    };
    assert!(err.is_transient());
    let source = std::error::Error::source(&err).expect("source");
    assert_eq!(source.to_string(), "boom");
}

#[test]
fn test_read_error_other_io_is_not_transient() {
    let err = ReadError::Io {
        id: ResourceId::from("secret.txt"),
        source: io_error(io::ErrorKind::PermissionDenied),
    };
    assert!(!err.is_transient());
    assert!(err.to_string().contains("secret.txt"));
}

#[test]
fn test_read_error_timed_out() {
    let err = ReadError::TimedOut {
        id: ResourceId::from("slow.txt"),
        after: Duration::from_millis(250),
    };
    assert!(err.is_transient());
    assert!(err.to_string().contains("250ms"));
}

#[test]
fn test_read_error_is_transparent_in_top_level_error() {
    let read = ReadError::NotFound {
        id: ResourceId::from("a"),
    };
    let err: Error = read.clone().into();
    assert_eq!(err.to_string(), read.to_string());
    assert!(matches!(err, Error::Read(ReadError::NotFound { .. })));
}

#[test]
fn test_watch_error_from_notify() {
    let err: WatchError = notify::Error::generic("inotify limit reached").into();
    assert!(err.to_string().contains("inotify limit reached"));
}

#[test]
fn test_read_error_aborted_is_final() {
    let err = ReadError::Aborted {
        id: ResourceId::from("a"),
    };
    assert!(!err.is_transient());
    assert!(!err.is_not_found());
    assert_eq!(err.to_string(), "Population of a was aborted");
}
