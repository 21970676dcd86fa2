// The Chromium launcher needs a local browser; these tests use the HTTP one.
#![cfg(not(feature = "browser"))]

mod integration {
    pub mod common;
    mod api_tests;
}
