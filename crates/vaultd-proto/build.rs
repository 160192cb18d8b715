fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generate server and client bindings from the shared proto file.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/vault.proto"], &["proto"])?;
    Ok(())
}
