mod native_watcher_test;
mod poll_watcher_test;
