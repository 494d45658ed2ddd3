// Copyright (c) 2023 The Cocoon Authors
//! gRPC definitions of the cocoon services.
//!
//! * `orderer`: ledger operations served by the orderers
//! * `connector`: operations of a cocoon, served by its connector
//! * `stub`: health and invoke, served by the cocoon code
//! * `api`: the platform facade
#![allow(missing_docs)]
#![allow(clippy::derive_partial_eq_without_eq)]

/// Records shared by the services
pub mod types {
    tonic::include_proto!("cocoon.types");
}

/// Orderer service
pub mod orderer {
    tonic::include_proto!("cocoon.orderer");
}

/// Connector service
pub mod connector {
    tonic::include_proto!("cocoon.connector");
}

/// Stub service
pub mod stub {
    tonic::include_proto!("cocoon.stub");
}

/// Api service
pub mod api {
    tonic::include_proto!("cocoon.api");
}

/// Encoded descriptors of every service, for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("cocoon_descriptor");

/// Conversions between the wire records and the models
pub mod mapping;
