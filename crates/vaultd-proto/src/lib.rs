//! Generated gRPC bindings for the vaultd wire protocol.
//!
//! The schema lives in `proto/vault.proto`; `build.rs` regenerates the
//! bindings on every build.

tonic::include_proto!("vault");
