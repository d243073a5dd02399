//! Behavioural test suites for the server.

mod support;
