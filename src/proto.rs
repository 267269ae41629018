//! Placement driver wire messages and gRPC stubs.
//!
//! Generated by `tonic-build` from `proto/*.proto`, the subset of the
//! upstream `pdpb`, `metapb` and `kvrpcpb` definitions this client speaks.
//! Field numbers match upstream so the client talks to an unmodified PD
//! server. The PD server stub is generated too and backs the in-process
//! gRPC tests.

#[allow(clippy::all)]
pub mod metapb {
    tonic::include_proto!("metapb");
}

#[allow(clippy::all)]
pub mod kvrpcpb {
    tonic::include_proto!("kvrpcpb");
}

#[allow(clippy::all)]
pub mod pdpb {
    tonic::include_proto!("pdpb");
}
