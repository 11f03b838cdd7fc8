// ABOUTME: Test helper modules
// ABOUTME: HTTP request builder for exercising axum routers without a server
#![allow(dead_code)]

pub mod axum_test;
