// Copyright (c) 2023 The Cocoon Authors

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let protos = [
        "proto/cocoon/types.proto",
        "proto/cocoon/orderer.proto",
        "proto/cocoon/connector.proto",
        "proto/cocoon/stub.proto",
        "proto/cocoon/api.proto",
    ];
    for proto in protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("cocoon_descriptor.bin"))
        .build_server(true)
        .build_transport(true)
        .build_client(true)
        .compile_protos(&protos, &["proto/cocoon"])?;
    Ok(())
}
